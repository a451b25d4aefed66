mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    entities::{
        Bid, BidStatus, Facility, OriginatingRequest, RequestKind, UserProfile, Vehicle,
        VehicleStatus,
    },
    error::Error,
};

/// Precondition of a conditional bid write. The store evaluates it and applies
/// the write as one atomic step; this is the only mutual exclusion the bid
/// workflow relies on.
#[derive(Clone, Debug, PartialEq)]
pub enum BidCondition {
    /// Bid is BIDDING and `expires_at` is still ahead of the instant.
    OpenAt(DateTime<Utc>),
    /// Bid is BIDDING and `expires_at` has been reached at the instant.
    LapsedAt(DateTime<Utc>),
    /// Bid is CONFIRMED for this driver.
    ConfirmedBy(String),
}

impl BidCondition {
    pub fn holds(&self, bid: &Bid) -> bool {
        match self {
            Self::OpenAt(at) => bid.is_bidding() && bid.expires_at > *at,
            Self::LapsedAt(at) => bid.is_bidding() && bid.expires_at <= *at,
            Self::ConfirmedBy(driver_id) => match &bid.status {
                BidStatus::Confirmed { assignment, .. } => &assignment.driver_id == driver_id,
                _ => false,
            },
        }
    }
}

/// The off-chain record store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, Error>;
    async fn find_vehicle(&self, id: &str) -> Result<Option<Vehicle>, Error>;
    async fn find_facility(&self, id: &str) -> Result<Option<Facility>, Error>;
    async fn find_request(
        &self,
        kind: RequestKind,
        id: &str,
    ) -> Result<Option<OriginatingRequest>, Error>;

    async fn insert_bid(&self, bid: &Bid) -> Result<(), Error>;
    async fn find_bid(&self, id: &str) -> Result<Option<Bid>, Error>;

    /// Bid `id` if it is BIDDING and `driver_id` is among its invited drivers.
    async fn find_open_bid(&self, id: &str, driver_id: &str) -> Result<Option<Bid>, Error>;

    /// Every BIDDING bid inviting `driver_id`, oldest first.
    async fn list_open_bids(&self, driver_id: &str) -> Result<Vec<Bid>, Error>;

    /// BIDDING bids whose deadline has passed at `now`, oldest deadline first.
    async fn list_lapsed_bids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Bid>, Error>;

    /// Replaces the stored bid with `bid` if `condition` holds for the stored
    /// one. Returns the number of bids written (0 or 1).
    async fn update_bid(&self, bid: &Bid, condition: &BidCondition) -> Result<u64, Error>;

    async fn update_vehicle_status(&self, id: &str, status: VehicleStatus) -> Result<u64, Error>;

    /// Moves the PENDING requests among `ids` to the kind's resolved status.
    async fn resolve_requests(&self, kind: RequestKind, ids: &[String]) -> Result<u64, Error>;

    async fn put_user(&self, user: &UserProfile) -> Result<(), Error>;
    async fn put_vehicle(&self, vehicle: &Vehicle) -> Result<(), Error>;
    async fn put_facility(&self, facility: &Facility) -> Result<(), Error>;
    async fn put_request(&self, request: &OriginatingRequest) -> Result<(), Error>;
}

#[test]
fn bid_condition_guards() {
    use crate::entities::sample_draft;
    use chrono::Duration;

    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));

    assert!(BidCondition::OpenAt(now).holds(&bid));
    assert!(!BidCondition::OpenAt(now + Duration::seconds(60)).holds(&bid));
    assert!(BidCondition::LapsedAt(now + Duration::seconds(60)).holds(&bid));
    assert!(!BidCondition::ConfirmedBy("driver-1".into()).holds(&bid));

    bid.confirm("driver-1", now).unwrap();
    assert!(!BidCondition::OpenAt(now).holds(&bid));
    assert!(!BidCondition::LapsedAt(now + Duration::seconds(60)).holds(&bid));
    assert!(BidCondition::ConfirmedBy("driver-1".into()).holds(&bid));
    assert!(!BidCondition::ConfirmedBy("driver-2".into()).holds(&bid));
}
