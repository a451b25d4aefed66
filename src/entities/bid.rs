use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{
    expired_error, invalid_state_error, not_eligible_error, validation_error, Error,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidAssignment {
    pub driver_id: String,
    pub vehicle_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopAction {
    Pickup,
    Delivery,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub unit: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub asset_id: String,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidStop {
    pub facility_id: String,
    pub action: StopAction,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// The already-decided allocation handed to the allocator: who is invited,
/// with which vehicle, to drive which itinerary, for which requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidDraft {
    #[serde(default)]
    pub original_request_ids: Vec<String>,
    #[serde(default)]
    pub fulfilled_replenishment_ids: Vec<String>,
    pub assignments: Vec<BidAssignment>,
    pub shipment_type: String,
    pub stops: Vec<BidStop>,
}

impl BidDraft {
    /// Shape checks that need no storage access.
    pub fn validate(&self) -> Result<(), Error> {
        if self.assignments.is_empty() {
            return Err(validation_error("at least one assignment is required"));
        }

        if self.stops.is_empty() {
            return Err(validation_error("at least one stop is required"));
        }

        if self.shipment_type.trim().is_empty() {
            return Err(validation_error("shipment type is required"));
        }

        let mut drivers = HashSet::new();
        for assignment in &self.assignments {
            if assignment.driver_id.is_empty() || assignment.vehicle_id.is_empty() {
                return Err(validation_error("assignment requires a driver and a vehicle"));
            }

            if !drivers.insert(assignment.driver_id.as_str()) {
                return Err(validation_error(format!(
                    "driver {} is invited more than once",
                    assignment.driver_id
                )));
            }
        }

        if self.stops.iter().any(|stop| stop.facility_id.is_empty()) {
            return Err(validation_error("every stop requires a facility"));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Bidding,
    Confirmed {
        assignment: BidAssignment,
        confirmed_at: DateTime<Utc>,
    },
    Completed {
        assignment: BidAssignment,
        confirmed_at: DateTime<Utc>,
        shipment_id: String,
    },
    Expired,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Bidding => "bidding".into(),
            Self::Confirmed { .. } => "confirmed".into(),
            Self::Completed { .. } => "completed".into(),
            Self::Expired => "expired".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub shipment_type: String,
    pub stops: Vec<BidStop>,
    pub assignments: Vec<BidAssignment>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub original_request_ids: Vec<String>,
    pub fulfilled_replenishment_ids: Vec<String>,
}

impl Bid {
    pub fn new(draft: BidDraft, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: new_bid_id(),
            shipment_type: draft.shipment_type,
            stops: draft.stops,
            assignments: draft.assignments,
            status: Status::Bidding,
            created_at: now,
            expires_at: now + ttl,
            original_request_ids: draft.original_request_ids,
            fulfilled_replenishment_ids: draft.fulfilled_replenishment_ids,
        }
    }

    pub fn is_bidding(&self) -> bool {
        matches!(self.status, Status::Bidding)
    }

    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_invited(&self, driver_id: &str) -> bool {
        self.assignment_for(driver_id).is_some()
    }

    pub fn assignment_for(&self, driver_id: &str) -> Option<&BidAssignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.driver_id == driver_id)
    }

    pub fn confirmed_assignment(&self) -> Option<&BidAssignment> {
        match &self.status {
            Status::Confirmed { assignment, .. } | Status::Completed { assignment, .. } => {
                Some(assignment)
            }
            _ => None,
        }
    }

    pub fn shipment_id(&self) -> Option<&str> {
        match &self.status {
            Status::Completed { shipment_id, .. } => Some(shipment_id.as_str()),
            _ => None,
        }
    }

    /// Identifier the ledger shipment is created under.
    pub fn derived_shipment_id(&self) -> String {
        format!("SHIP-{}", self.id)
    }

    pub fn invited_drivers(&self) -> Vec<String> {
        self.assignments
            .iter()
            .map(|assignment| assignment.driver_id.clone())
            .collect()
    }

    pub fn other_drivers(&self, driver_id: &str) -> Vec<String> {
        self.assignments
            .iter()
            .filter(|assignment| assignment.driver_id != driver_id)
            .map(|assignment| assignment.driver_id.clone())
            .collect()
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn confirm(&mut self, driver_id: &str, at: DateTime<Utc>) -> Result<BidAssignment, Error> {
        if !self.is_bidding() {
            return Err(invalid_state_error());
        }

        if self.is_lapsed(at) {
            return Err(expired_error());
        }

        let assignment = self
            .assignment_for(driver_id)
            .cloned()
            .ok_or_else(|| not_eligible_error("driver is not invited to this bid"))?;

        self.status = Status::Confirmed {
            assignment: assignment.clone(),
            confirmed_at: at,
        };

        Ok(assignment)
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn expire(&mut self, at: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Bidding if self.is_lapsed(at) => {
                self.status = Status::Expired;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    /// Undoes a confirmation, handing the released assignment back.
    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn reopen(&mut self) -> Result<BidAssignment, Error> {
        match &self.status {
            Status::Confirmed { assignment, .. } => {
                let assignment = assignment.clone();
                self.status = Status::Bidding;
                Ok(assignment)
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn complete(&mut self, shipment_id: String) -> Result<(), Error> {
        match &self.status {
            Status::Confirmed {
                assignment,
                confirmed_at,
            } => {
                self.status = Status::Completed {
                    assignment: assignment.clone(),
                    confirmed_at: *confirmed_at,
                    shipment_id,
                };
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }
}

fn new_bid_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("BID-{}", suffix[..8].to_uppercase())
}

#[cfg(test)]
pub(crate) fn sample_draft() -> BidDraft {
    BidDraft {
        original_request_ids: vec!["DR-1".into()],
        fulfilled_replenishment_ids: vec!["RR-1".into()],
        assignments: vec![
            BidAssignment {
                driver_id: "driver-1".into(),
                vehicle_id: "vehicle-1".into(),
            },
            BidAssignment {
                driver_id: "driver-2".into(),
                vehicle_id: "vehicle-2".into(),
            },
        ],
        shipment_type: "DISTRIBUTION".into(),
        stops: vec![
            BidStop {
                facility_id: "farm-A".into(),
                action: StopAction::Pickup,
                items: vec![],
            },
            BidStop {
                facility_id: "retail-B".into(),
                action: StopAction::Delivery,
                items: vec![],
            },
        ],
    }
}

#[test]
fn new_bid_has_formatted_id_and_ttl() {
    let now = Utc::now();
    let bid = Bid::new(sample_draft(), now, Duration::seconds(60));

    assert!(bid.id.starts_with("BID-"));
    assert_eq!(bid.id.len(), 12);
    assert_eq!(bid.id[4..], bid.id[4..].to_uppercase());
    assert_eq!(bid.expires_at - bid.created_at, Duration::seconds(60));
    assert!(bid.is_bidding());
    assert_eq!(bid.derived_shipment_id(), format!("SHIP-{}", bid.id));
}

#[test]
fn draft_validation_rejects_duplicate_drivers() {
    let mut draft = sample_draft();
    draft.assignments.push(BidAssignment {
        driver_id: "driver-1".into(),
        vehicle_id: "vehicle-3".into(),
    });

    let err = draft.validate().unwrap_err();
    assert!(err.is_invalid_input_error());
}

#[test]
fn draft_validation_requires_itinerary_and_type() {
    let mut draft = sample_draft();
    draft.stops.clear();
    assert!(draft.validate().is_err());

    let mut draft = sample_draft();
    draft.shipment_type = "  ".into();
    assert!(draft.validate().is_err());

    assert!(sample_draft().validate().is_ok());
}

#[test]
fn confirm_then_complete() {
    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));

    let assignment = bid.confirm("driver-2", now).unwrap();
    assert_eq!(assignment.vehicle_id, "vehicle-2");
    assert_eq!(bid.confirmed_assignment(), Some(&assignment));
    assert_eq!(bid.shipment_id(), None);

    // a second confirmation must not overwrite the winner
    assert!(bid.confirm("driver-1", now).is_err());

    bid.complete(bid.derived_shipment_id()).unwrap();
    assert_eq!(bid.status.name(), "completed");
    assert_eq!(bid.confirmed_assignment(), Some(&assignment));
    assert!(bid.shipment_id().is_some());
}

#[test]
fn confirm_rejects_uninvited_and_lapsed() {
    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));

    let err = bid.confirm("stranger", now).unwrap_err();
    assert_eq!(err.code, 202);

    let err = bid.confirm("driver-1", now + Duration::seconds(61)).unwrap_err();
    assert_eq!(err, expired_error());
    assert!(bid.is_bidding());
}

#[test]
fn reopen_clears_confirmation() {
    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));
    bid.confirm("driver-1", now).unwrap();

    let released = bid.reopen().unwrap();
    assert_eq!(released.driver_id, "driver-1");
    assert!(bid.is_bidding());
    assert_eq!(bid.confirmed_assignment(), None);

    assert!(bid.reopen().is_err());
}

#[test]
fn expire_only_after_deadline() {
    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));

    assert!(bid.expire(now).is_err());
    bid.expire(now + Duration::seconds(60)).unwrap();
    assert_eq!(bid.status, Status::Expired);
    assert!(bid.confirm("driver-1", now).is_err());
}

#[test]
fn status_serializes_with_name_tag() {
    let now = Utc::now();
    let mut bid = Bid::new(sample_draft(), now, Duration::seconds(60));
    bid.confirm("driver-1", now).unwrap();

    let value = serde_json::to_value(&bid.status).unwrap();
    assert_eq!(value["name"], "confirmed");
    assert_eq!(value["assignment"]["driver_id"], "driver-1");
}
