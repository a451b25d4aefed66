use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Dispatch,
    Replenishment,
}

impl RequestKind {
    /// Status a request of this kind ends in once its bid completes.
    pub fn resolved_status(&self) -> Status {
        match self {
            Self::Dispatch => Status::Processed,
            Self::Replenishment => Status::Fulfilled,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch_requests",
            Self::Replenishment => "replenishment_requests",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Processed,
    Fulfilled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "PENDING".into(),
            Self::Processed => "PROCESSED".into(),
            Self::Fulfilled => "FULFILLED".into(),
        }
    }
}

/// A dispatch or replenishment request waiting to be served by a bid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginatingRequest {
    pub id: String,
    pub kind: RequestKind,
    pub facility_id: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl OriginatingRequest {
    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }
}

#[test]
fn resolved_status_per_kind() {
    assert_eq!(RequestKind::Dispatch.resolved_status(), Status::Processed);
    assert_eq!(RequestKind::Replenishment.resolved_status(), Status::Fulfilled);
    assert_eq!(Status::Fulfilled.name(), "FULFILLED");
}
