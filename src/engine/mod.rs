mod allocator;
mod arbiter;
mod bid_api;
mod coordinator;
mod reaper;

pub use reaper::spawn_reaper;

use std::sync::Arc;

use chrono::Duration;
use oso::Oso;

use crate::{
    api::API,
    auth::authorizor,
    db::Store,
    error::{unauthorized_error, Error},
    external::Ledger,
    notify::Hub,
};

#[derive(Clone, Debug)]
pub struct Settings {
    /// Confirmation window of a new bid.
    pub bid_ttl: Duration,
    /// Upper bound on bids expired by one sweep.
    pub reaper_batch_size: i64,
    /// Identity used for read-only ledger queries.
    pub ledger_reader: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bid_ttl: Duration::seconds(60),
            reaper_batch_size: 100,
            ledger_reader: "admin".into(),
        }
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    hub: Arc<Hub>,
    authorizor: Oso,
    settings: Settings,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        hub: Arc<Hub>,
        settings: Settings,
    ) -> Result<Self, Error> {
        Ok(Self {
            store,
            ledger,
            hub,
            authorizor: authorizor::new()?,
            settings,
        })
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }

    pub fn is_allowed<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<bool, Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        Ok(self.authorizor.is_allowed(actor, action, resource)?)
    }
}

impl API for Engine {}
