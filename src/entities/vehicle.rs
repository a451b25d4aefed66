use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub plate_number: String,
    pub owner_driver_id: String,
    #[serde(default)]
    pub model: String,
    pub status: Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Available,
    InTrip,
    Maintenance,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Available => "AVAILABLE".into(),
            Self::InTrip => "IN_TRIP".into(),
            Self::Maintenance => "MAINTENANCE".into(),
        }
    }
}

impl Vehicle {
    pub fn is_available(&self) -> bool {
        self.status == Status::Available
    }

    pub fn is_owned_by(&self, driver_id: &str) -> bool {
        self.owner_driver_id == driver_id
    }
}

#[test]
fn ownership_is_independent_of_status() {
    let mut vehicle = Vehicle {
        id: "vehicle-1".into(),
        plate_number: "29C-123.45".into(),
        owner_driver_id: "driver-1".into(),
        model: "Hyundai Porter H150".into(),
        status: Status::Available,
    };

    assert!(vehicle.is_available());
    assert!(vehicle.is_owned_by("driver-1"));
    assert!(!vehicle.is_owned_by("driver-2"));

    vehicle.status = Status::Maintenance;
    assert!(!vehicle.is_available());
    assert!(vehicle.is_owned_by("driver-1"));
}

#[test]
fn status_wire_names() {
    assert_eq!(
        serde_json::to_value(Status::InTrip).unwrap(),
        serde_json::json!("IN_TRIP")
    );
    assert_eq!(Status::Maintenance.name(), "MAINTENANCE");
}
