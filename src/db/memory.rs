use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BidCondition, Store};
use crate::{
    entities::{Bid, Facility, OriginatingRequest, RequestKind, UserProfile, Vehicle, VehicleStatus},
    error::Error,
};

#[derive(Default)]
struct Collections {
    users: HashMap<String, UserProfile>,
    vehicles: HashMap<String, Vehicle>,
    facilities: HashMap<String, Facility>,
    requests: HashMap<(RequestKind, String), OriginatingRequest>,
    bids: HashMap<String, Bid>,
}

/// Process-local store. Every operation runs under one lock, which makes each
/// conditional write atomic with respect to its predicate. It only arbitrates
/// between callers inside this process; multi-instance deployments need
/// `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, Error> {
        Ok(self.inner.lock().await.users.get(id).cloned())
    }

    async fn find_vehicle(&self, id: &str) -> Result<Option<Vehicle>, Error> {
        Ok(self.inner.lock().await.vehicles.get(id).cloned())
    }

    async fn find_facility(&self, id: &str) -> Result<Option<Facility>, Error> {
        Ok(self.inner.lock().await.facilities.get(id).cloned())
    }

    async fn find_request(
        &self,
        kind: RequestKind,
        id: &str,
    ) -> Result<Option<OriginatingRequest>, Error> {
        let collections = self.inner.lock().await;
        Ok(collections.requests.get(&(kind, id.to_string())).cloned())
    }

    async fn insert_bid(&self, bid: &Bid) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .bids
            .insert(bid.id.clone(), bid.clone());

        Ok(())
    }

    async fn find_bid(&self, id: &str) -> Result<Option<Bid>, Error> {
        Ok(self.inner.lock().await.bids.get(id).cloned())
    }

    async fn find_open_bid(&self, id: &str, driver_id: &str) -> Result<Option<Bid>, Error> {
        let collections = self.inner.lock().await;

        Ok(collections
            .bids
            .get(id)
            .filter(|bid| bid.is_bidding() && bid.is_invited(driver_id))
            .cloned())
    }

    async fn list_open_bids(&self, driver_id: &str) -> Result<Vec<Bid>, Error> {
        let collections = self.inner.lock().await;

        let mut bids: Vec<Bid> = collections
            .bids
            .values()
            .filter(|bid| bid.is_bidding() && bid.is_invited(driver_id))
            .cloned()
            .collect();
        bids.sort_by_key(|bid| bid.created_at);

        Ok(bids)
    }

    async fn list_lapsed_bids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Bid>, Error> {
        let collections = self.inner.lock().await;

        let mut bids: Vec<Bid> = collections
            .bids
            .values()
            .filter(|bid| bid.is_bidding() && bid.is_lapsed(now))
            .cloned()
            .collect();
        bids.sort_by_key(|bid| bid.expires_at);
        bids.truncate(limit.max(0) as usize);

        Ok(bids)
    }

    async fn update_bid(&self, bid: &Bid, condition: &BidCondition) -> Result<u64, Error> {
        let mut collections = self.inner.lock().await;

        match collections.bids.get_mut(&bid.id) {
            Some(stored) if condition.holds(stored) => {
                *stored = bid.clone();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_vehicle_status(&self, id: &str, status: VehicleStatus) -> Result<u64, Error> {
        let mut collections = self.inner.lock().await;

        match collections.vehicles.get_mut(id) {
            Some(vehicle) => {
                vehicle.status = status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn resolve_requests(&self, kind: RequestKind, ids: &[String]) -> Result<u64, Error> {
        let mut collections = self.inner.lock().await;
        let mut resolved = 0;

        for id in ids {
            if let Some(request) = collections.requests.get_mut(&(kind, id.clone())) {
                if request.is_pending() {
                    request.status = kind.resolved_status();
                    resolved += 1;
                }
            }
        }

        Ok(resolved)
    }

    async fn put_user(&self, user: &UserProfile) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .users
            .insert(user.id.clone(), user.clone());

        Ok(())
    }

    async fn put_vehicle(&self, vehicle: &Vehicle) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .vehicles
            .insert(vehicle.id.clone(), vehicle.clone());

        Ok(())
    }

    async fn put_facility(&self, facility: &Facility) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .facilities
            .insert(facility.id.clone(), facility.clone());

        Ok(())
    }

    async fn put_request(&self, request: &OriginatingRequest) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .requests
            .insert((request.kind, request.id.clone()), request.clone());

        Ok(())
    }
}

#[tokio::test]
async fn conditional_update_admits_one_writer() {
    use crate::entities::sample_draft;
    use chrono::Duration;

    let store = MemoryStore::new();
    let now = Utc::now();
    let bid = Bid::new(sample_draft(), now, Duration::seconds(60));
    store.insert_bid(&bid).await.unwrap();

    let mut first = bid.clone();
    first.confirm("driver-1", now).unwrap();
    let mut second = bid.clone();
    second.confirm("driver-2", now).unwrap();

    let condition = BidCondition::OpenAt(now);
    assert_eq!(store.update_bid(&first, &condition).await.unwrap(), 1);
    assert_eq!(store.update_bid(&second, &condition).await.unwrap(), 0);

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmed_assignment().unwrap().driver_id, "driver-1");
    assert!(store.find_open_bid(&bid.id, "driver-2").await.unwrap().is_none());
}

#[tokio::test]
async fn open_bid_lookup_requires_invitation() {
    use crate::entities::sample_draft;
    use chrono::Duration;

    let store = MemoryStore::new();
    let bid = Bid::new(sample_draft(), Utc::now(), Duration::seconds(60));
    store.insert_bid(&bid).await.unwrap();

    assert!(store.find_open_bid(&bid.id, "driver-1").await.unwrap().is_some());
    assert!(store.find_open_bid(&bid.id, "stranger").await.unwrap().is_none());
    assert_eq!(store.list_open_bids("driver-2").await.unwrap().len(), 1);
    assert!(store.list_open_bids("stranger").await.unwrap().is_empty());
}
