use chrono::{DateTime, Utc};

use super::Engine;
use crate::{
    db::BidCondition,
    entities::{Bid, BidStatus},
    error::{conflict_error, expired_error, Error},
};

const NOT_AVAILABLE: &str = "not available for you, already decided, or unknown bid";

impl Engine {
    /// Moves an open bid to CONFIRMED for `driver_id`. Exactly one caller wins
    /// a bid; the conditional write in the store decides which.
    #[tracing::instrument(skip(self))]
    pub(super) async fn arbitrate(&self, bid_id: &str, driver_id: &str) -> Result<Bid, Error> {
        let Some(bid) = self.store.find_open_bid(bid_id, driver_id).await? else {
            return Err(self.explain_unavailable(bid_id, driver_id).await);
        };

        let now = Utc::now();
        if bid.is_lapsed(now) {
            self.expire_lapsed_bid(&bid, now).await;
            return Err(expired_error());
        }

        let mut confirmed = bid;
        confirmed.confirm(driver_id, now)?;

        let written = self
            .store
            .update_bid(&confirmed, &BidCondition::OpenAt(now))
            .await?;
        if written == 0 {
            tracing::info!("lost the race for the bid");
            return Err(self.explain_unavailable(bid_id, driver_id).await);
        }

        tracing::info!("bid confirmed");

        Ok(confirmed)
    }

    /// Best-effort lazy expiry; a failure here leaves the bid for the reaper.
    pub(super) async fn expire_lapsed_bid(&self, bid: &Bid, now: DateTime<Utc>) -> bool {
        let mut expired = bid.clone();
        if expired.expire(now).is_err() {
            return false;
        }

        match self
            .store
            .update_bid(&expired, &BidCondition::LapsedAt(now))
            .await
        {
            Ok(1) => {
                tracing::info!(bid_id = %bid.id, "bid expired");
                true
            }
            Ok(_) => false,
            Err(err) => {
                tracing::warn!(bid_id = %bid.id, error = %err, "failed to expire bid");
                false
            }
        }
    }

    /// Turns a failed confirmation into a conflict the caller can act on. The
    /// outcome is already decided; this only picks the message.
    async fn explain_unavailable(&self, bid_id: &str, driver_id: &str) -> Error {
        let bid = match self.store.find_bid(bid_id).await {
            Ok(Some(bid)) if bid.is_invited(driver_id) => bid,
            Ok(_) => return conflict_error(NOT_AVAILABLE),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read bid after lost confirmation");
                return conflict_error(NOT_AVAILABLE);
            }
        };

        match &bid.status {
            BidStatus::Confirmed { assignment, .. } | BidStatus::Completed { assignment, .. }
                if assignment.driver_id == driver_id =>
            {
                conflict_error("already confirmed by you")
            }
            BidStatus::Confirmed { .. } | BidStatus::Completed { .. } => {
                conflict_error("confirmed by another driver")
            }
            BidStatus::Expired => expired_error(),
            BidStatus::Bidding if bid.is_lapsed(Utc::now()) => expired_error(),
            BidStatus::Bidding => conflict_error("bid changed while confirming, try again"),
        }
    }
}
