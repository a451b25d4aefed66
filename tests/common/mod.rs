#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use haulbid::auth::User;
use haulbid::db::{BidCondition, MemoryStore, Store};
use haulbid::engine::{Engine, Settings};
use haulbid::entities::{
    Address, Bid, BidAssignment, BidDraft, BidStop, Facility, Item, OriginatingRequest,
    Quantity, RequestKind, RequestStatus, StopAction, UserProfile, Vehicle, VehicleStatus,
};
use haulbid::error::{database_error, not_found_error, upstream_error, Error};
use haulbid::external::Ledger;
use haulbid::notify::Hub;

pub const CREATE_SHIPMENT: &str = "CreateShipment";

#[derive(Clone, Debug)]
pub struct Submission {
    pub identity: String,
    pub name: String,
    pub args: Vec<String>,
}

/// In-test ledger: records submissions, keeps created shipments, and can be
/// told to reject everything.
#[derive(Default)]
pub struct ScriptedLedger {
    failing: AtomicBool,
    submissions: Mutex<Vec<Submission>>,
    shipments: Mutex<HashMap<String, serde_json::Value>>,
}

impl ScriptedLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn submit_transaction(
        &self,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(upstream_error("endorsement failed"));
        }

        self.submissions.lock().await.push(Submission {
            identity: identity.into(),
            name: name.into(),
            args: args.to_vec(),
        });

        if name == CREATE_SHIPMENT {
            let stops: serde_json::Value =
                serde_json::from_str(&args[5]).map_err(|_| upstream_error("bad stops"))?;
            let shipment = serde_json::json!({
                "shipmentID": args[0],
                "shipmentType": args[1],
                "driverID": args[2],
                "driverName": args[3],
                "vehiclePlate": args[4],
                "stops": stops,
                "status": "PENDING",
            });
            self.shipments.lock().await.insert(args[0].clone(), shipment);
        }

        Ok(Vec::new())
    }

    async fn evaluate_transaction(
        &self,
        _identity: &str,
        _name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error> {
        let shipments = self.shipments.lock().await;
        let shipment = shipments
            .get(&args[0])
            .ok_or_else(|| not_found_error("shipment not found"))?;

        Ok(serde_json::to_vec(shipment).map_err(|_| upstream_error("bad shipment"))?)
    }
}

/// Delegates to a `MemoryStore` but can be made to fail the writes that follow
/// a ledger commit.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    pub fail_vehicle_updates: AtomicBool,
    pub fail_request_updates: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_vehicle_updates: AtomicBool::new(false),
            fail_request_updates: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, Error> {
        self.inner.find_user(id).await
    }

    async fn find_vehicle(&self, id: &str) -> Result<Option<Vehicle>, Error> {
        self.inner.find_vehicle(id).await
    }

    async fn find_facility(&self, id: &str) -> Result<Option<Facility>, Error> {
        self.inner.find_facility(id).await
    }

    async fn find_request(
        &self,
        kind: RequestKind,
        id: &str,
    ) -> Result<Option<OriginatingRequest>, Error> {
        self.inner.find_request(kind, id).await
    }

    async fn insert_bid(&self, bid: &Bid) -> Result<(), Error> {
        self.inner.insert_bid(bid).await
    }

    async fn find_bid(&self, id: &str) -> Result<Option<Bid>, Error> {
        self.inner.find_bid(id).await
    }

    async fn find_open_bid(&self, id: &str, driver_id: &str) -> Result<Option<Bid>, Error> {
        self.inner.find_open_bid(id, driver_id).await
    }

    async fn list_open_bids(&self, driver_id: &str) -> Result<Vec<Bid>, Error> {
        self.inner.list_open_bids(driver_id).await
    }

    async fn list_lapsed_bids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Bid>, Error> {
        self.inner.list_lapsed_bids(now, limit).await
    }

    async fn update_bid(&self, bid: &Bid, condition: &BidCondition) -> Result<u64, Error> {
        self.inner.update_bid(bid, condition).await
    }

    async fn update_vehicle_status(&self, id: &str, status: VehicleStatus) -> Result<u64, Error> {
        if self.fail_vehicle_updates.load(Ordering::SeqCst) {
            return Err(database_error("connection reset"));
        }
        self.inner.update_vehicle_status(id, status).await
    }

    async fn resolve_requests(&self, kind: RequestKind, ids: &[String]) -> Result<u64, Error> {
        if self.fail_request_updates.load(Ordering::SeqCst) {
            return Err(database_error("connection reset"));
        }
        self.inner.resolve_requests(kind, ids).await
    }

    async fn put_user(&self, user: &UserProfile) -> Result<(), Error> {
        self.inner.put_user(user).await
    }

    async fn put_vehicle(&self, vehicle: &Vehicle) -> Result<(), Error> {
        self.inner.put_vehicle(vehicle).await
    }

    async fn put_facility(&self, facility: &Facility) -> Result<(), Error> {
        self.inner.put_facility(facility).await
    }

    async fn put_request(&self, request: &OriginatingRequest) -> Result<(), Error> {
        self.inner.put_request(request).await
    }
}

pub const DRIVERS: [(&str, &str, &str); 3] = [
    ("driver-1", "Driver One", "vehicle-1"),
    ("driver-2", "Driver Two", "vehicle-2"),
    ("driver-3", "Driver Three", "vehicle-3"),
];

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    store
        .put_user(&UserProfile {
            id: "admin-1".into(),
            name: "Admin".into(),
            role: "admin".into(),
        })
        .await
        .unwrap();

    for (index, (driver_id, name, vehicle_id)) in DRIVERS.iter().enumerate() {
        store
            .put_user(&UserProfile {
                id: driver_id.to_string(),
                name: name.to_string(),
                role: "driver".into(),
            })
            .await
            .unwrap();
        store
            .put_vehicle(&Vehicle {
                id: vehicle_id.to_string(),
                plate_number: format!("29C-000.0{}", index + 1),
                owner_driver_id: driver_id.to_string(),
                model: "Isuzu QKR".into(),
                status: VehicleStatus::Available,
            })
            .await
            .unwrap();
    }

    for (id, name) in [("farm-A", "Organic Farm A"), ("retail-B", "Retail Store B")] {
        store
            .put_facility(&Facility {
                id: id.into(),
                name: name.into(),
                kind: String::new(),
                address: Address {
                    full_text: format!("{} address", name),
                    latitude: 10.0,
                    longitude: 106.0,
                },
            })
            .await
            .unwrap();
    }

    for (id, kind) in [("DR-1", RequestKind::Dispatch), ("RR-1", RequestKind::Replenishment)] {
        store
            .put_request(&OriginatingRequest {
                id: id.into(),
                kind,
                facility_id: "retail-B".into(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    store
}

/// A draft inviting the first `drivers` seeded drivers.
pub fn draft(drivers: usize) -> BidDraft {
    BidDraft {
        original_request_ids: vec!["DR-1".into()],
        fulfilled_replenishment_ids: vec!["RR-1".into()],
        assignments: DRIVERS
            .iter()
            .take(drivers)
            .map(|(driver_id, _, vehicle_id)| BidAssignment {
                driver_id: driver_id.to_string(),
                vehicle_id: vehicle_id.to_string(),
            })
            .collect(),
        shipment_type: "DISTRIBUTION".into(),
        stops: vec![
            BidStop {
                facility_id: "farm-A".into(),
                action: StopAction::Pickup,
                items: vec![Item {
                    asset_id: "ASSET-1".into(),
                    quantity: Quantity {
                        unit: "kg".into(),
                        value: 120.0,
                    },
                }],
            },
            BidStop {
                facility_id: "retail-B".into(),
                action: StopAction::Delivery,
                items: vec![],
            },
        ],
    }
}

pub fn engine(store: Arc<dyn Store>, ledger: Arc<ScriptedLedger>, ttl: Duration) -> Arc<Engine> {
    let settings = Settings {
        bid_ttl: ttl,
        ..Settings::default()
    };

    Arc::new(Engine::new(store, ledger, Arc::new(Hub::new()), settings).unwrap())
}

pub fn admin() -> User {
    User::new("admin-1", vec!["admin".into()])
}

pub fn driver(id: &str) -> User {
    User::new(id, vec!["driver".into()])
}
