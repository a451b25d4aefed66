use super::Engine;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    api::BidAPI,
    auth::{Platform, User},
    entities::{Bid, BidDraft, Confirmation, ShipmentDraft},
    error::{not_found_error, Error},
};

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self, draft))]
    async fn create_bid(&self, user: User, draft: BidDraft) -> Result<Bid, Error> {
        self.authorize(user, "create_bid", Platform::default())?;

        self.allocate(draft).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, user: User, id: String) -> Result<Bid, Error> {
        self.authorize(user.clone(), "read_bid", Platform::default())?;

        let bid = self
            .store
            .find_bid(&id)
            .await?
            .ok_or_else(|| not_found_error("bid not found"))?;

        // drivers only see bids they are invited to
        if !bid.is_invited(&user.id) && !self.is_allowed(user, "create_bid", Platform::default())? {
            return Err(not_found_error("bid not found"));
        }

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn list_open_bids(&self, user: User) -> Result<Vec<Bid>, Error> {
        self.authorize(user.clone(), "list_bids", Platform::default())?;

        self.store.list_open_bids(&user.id).await
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_bid(&self, user: User, id: String) -> Result<Confirmation, Error> {
        self.authorize(user.clone(), "confirm_bid", Platform::default())?;

        let bid = self.arbitrate(&id, &user.id).await?;

        self.commit(bid, &user.id).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_shipment(&self, user: User, id: String) -> Result<serde_json::Value, Error> {
        let bid = self.find_bid(user, id).await?;

        let shipment_id = bid
            .shipment_id()
            .ok_or_else(|| not_found_error("no shipment recorded for this bid"))?;

        let payload = self
            .ledger
            .evaluate_transaction(
                &self.settings.ledger_reader,
                ShipmentDraft::READ_TRANSACTION,
                &[shipment_id.to_string()],
            )
            .await?;

        Ok(serde_json::from_slice(&payload)?)
    }

    #[tracing::instrument(skip(self))]
    async fn expire_lapsed_bids(&self, user: User) -> Result<Vec<String>, Error> {
        self.authorize(user, "expire_bids", Platform::default())?;

        self.expire_lapsed(Utc::now()).await
    }
}
