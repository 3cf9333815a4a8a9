pub mod bids;
pub mod loads;
pub mod messages;
pub mod notifications;
pub mod trips;
