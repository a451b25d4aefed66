use async_trait::async_trait;

use crate::auth::User;
use crate::entities::{Bid, BidDraft, Confirmation};
use crate::error::Error;

#[async_trait]
pub trait BidAPI {
    async fn create_bid(&self, user: User, draft: BidDraft) -> Result<Bid, Error>;

    async fn find_bid(&self, user: User, id: String) -> Result<Bid, Error>;

    async fn list_open_bids(&self, user: User) -> Result<Vec<Bid>, Error>;

    async fn confirm_bid(&self, user: User, id: String) -> Result<Confirmation, Error>;

    async fn find_shipment(&self, user: User, id: String) -> Result<serde_json::Value, Error>;

    async fn expire_lapsed_bids(&self, user: User) -> Result<Vec<String>, Error>;
}

pub trait API: BidAPI {}
