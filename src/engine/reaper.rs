use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Engine;
use crate::error::Error;

impl Engine {
    /// One expiry sweep. Every flip goes through the same conditional write
    /// as confirmation, so a bid confirmed in the meantime is left alone.
    #[tracing::instrument(skip(self))]
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<String>, Error> {
        let lapsed = self
            .store
            .list_lapsed_bids(now, self.settings.reaper_batch_size)
            .await?;

        let mut expired = Vec::with_capacity(lapsed.len());
        for bid in &lapsed {
            if self.expire_lapsed_bid(bid, now).await {
                expired.push(bid.id.clone());
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "lapsed bids expired");
        }

        Ok(expired)
    }
}

pub fn spawn_reaper(engine: Arc<Engine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(err) = engine.expire_lapsed(Utc::now()).await {
                tracing::warn!(error = %err, "expiry sweep failed");
            }
        }
    })
}
