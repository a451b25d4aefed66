use chrono::Utc;

use super::Engine;
use crate::{
    entities::{Bid, BidDraft, Notification},
    error::{validation_error, Error},
};

impl Engine {
    /// Persists an already-decided allocation as an open bid and announces it
    /// to every invited driver.
    #[tracing::instrument(skip(self, draft), fields(drivers = draft.assignments.len()))]
    pub(super) async fn allocate(&self, draft: BidDraft) -> Result<Bid, Error> {
        draft.validate()?;

        for assignment in &draft.assignments {
            let driver = self.store.find_user(&assignment.driver_id).await?;
            if !driver.map_or(false, |profile| profile.is_driver()) {
                return Err(validation_error(format!(
                    "unknown driver {}",
                    assignment.driver_id
                )));
            }

            if self.store.find_vehicle(&assignment.vehicle_id).await?.is_none() {
                return Err(validation_error(format!(
                    "unknown vehicle {}",
                    assignment.vehicle_id
                )));
            }
        }

        let bid = Bid::new(draft, Utc::now(), self.settings.bid_ttl);
        self.store.insert_bid(&bid).await?;

        tracing::info!(bid_id = %bid.id, expires_at = %bid.expires_at, "bid created");

        let notification = Notification::NewTransportBid { bid: bid.clone() };
        self.hub
            .notify_all(&bid.invited_drivers(), &notification)
            .await;

        Ok(bid)
    }
}
