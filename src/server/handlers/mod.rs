pub mod bids;
pub mod push;
