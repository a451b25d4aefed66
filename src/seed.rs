use std::path::Path;

use serde::Deserialize;

use crate::{
    db::Store,
    entities::{Facility, OriginatingRequest, UserProfile, Vehicle},
    error::{config_error, Error},
};

/// Master data loaded into an empty store for development.
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub requests: Vec<OriginatingRequest>,
}

impl Fixture {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|err| config_error(format!("cannot read {}: {}", path.display(), err)))?;

        Self::from_slice(&raw)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(raw).map_err(|err| config_error(format!("malformed fixture: {}", err)))
    }

    #[tracing::instrument(skip_all)]
    pub async fn load(&self, store: &dyn Store) -> Result<(), Error> {
        for user in &self.users {
            store.put_user(user).await?;
        }
        for vehicle in &self.vehicles {
            store.put_vehicle(vehicle).await?;
        }
        for facility in &self.facilities {
            store.put_facility(facility).await?;
        }
        for request in &self.requests {
            store.put_request(request).await?;
        }

        tracing::info!(
            users = self.users.len(),
            vehicles = self.vehicles.len(),
            facilities = self.facilities.len(),
            requests = self.requests.len(),
            "fixture loaded"
        );

        Ok(())
    }
}

#[tokio::test]
async fn fixture_populates_store() {
    use crate::db::MemoryStore;
    use crate::entities::{RequestKind, VehicleStatus};

    let raw = br#"{
        "users": [{ "id": "driver-1", "name": "Driver One", "role": "driver" }],
        "vehicles": [{
            "id": "vehicle-1",
            "plate_number": "29C-123.45",
            "owner_driver_id": "driver-1",
            "status": "AVAILABLE"
        }],
        "facilities": [{
            "id": "farm-A",
            "name": "Organic Farm A",
            "address": { "full_text": "1 Farm Road" }
        }],
        "requests": [{
            "id": "DR-1",
            "kind": "dispatch",
            "facility_id": "retail-B",
            "status": "PENDING",
            "created_at": "2026-01-01T00:00:00Z"
        }]
    }"#;

    let store = MemoryStore::new();
    Fixture::from_slice(raw).unwrap().load(&store).await.unwrap();

    let vehicle = store.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available);
    assert!(store.find_user("driver-1").await.unwrap().unwrap().is_driver());
    assert!(store.find_facility("farm-A").await.unwrap().is_some());
    assert!(store
        .find_request(RequestKind::Dispatch, "DR-1")
        .await
        .unwrap()
        .unwrap()
        .is_pending());
}

#[test]
fn malformed_fixture_is_a_config_error() {
    let err = Fixture::from_slice(b"{ \"users\": 3 }").unwrap_err();
    assert!(err.is_internal());
    assert!(err.message.starts_with("malformed fixture"));
}
