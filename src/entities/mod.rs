mod bid;
mod confirmation;
mod facility;
mod notification;
mod profile;
mod request;
mod shipment;
mod vehicle;

pub use bid::{Bid, BidAssignment, BidDraft, BidStop, Item, Quantity, StopAction};
pub use confirmation::Confirmation;
pub use facility::{Address, Facility};
pub use notification::Notification;
pub use profile::UserProfile;
pub use request::{OriginatingRequest, RequestKind};
pub use shipment::{EnrichedStop, LedgerAddress, LedgerItem, ShipmentDraft};
pub use vehicle::Vehicle;

pub use bid::Status as BidStatus;
pub use request::Status as RequestStatus;
pub use vehicle::Status as VehicleStatus;

#[cfg(test)]
pub(crate) use bid::sample_draft;
