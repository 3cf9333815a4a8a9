//! Persistence seam for the engine.
//!
//! A [`Store`] serves non-locking reads, which may come from a replica, and opens
//! [`Tx`] handles for every mutation. A transaction reads current state with
//! row locks, lets the entity decide whether the change is valid, writes and
//! commits. Losing a serialization race surfaces as a conflict error, either
//! from a write or from `commit`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{
    Bid, BidScope, BidStatus, Load, Notification, TrackingEvent, Trip, TripMessage,
};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadFilter {
    /// Loads still in `open` or `bidding`.
    AcceptingBids,
    Shipper(Uuid),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error>;

    async fn find_load(&self, id: Uuid) -> Result<Option<Load>, Error>;
    /// Newest first.
    async fn list_loads(&self, filter: LoadFilter) -> Result<Vec<Load>, Error>;

    /// Newest first.
    async fn list_bids(&self, scope: BidScope, status: Option<BidStatus>)
        -> Result<Vec<Bid>, Error>;

    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error>;
    /// Trips where the user is the carrier, or the shipper of the trip's load. Newest first.
    async fn list_trips_for_user(&self, user_id: Uuid) -> Result<Vec<Trip>, Error>;

    /// Oldest first.
    async fn list_tracking_events(&self, trip_id: Uuid) -> Result<Vec<TrackingEvent>, Error>;

    /// Oldest first.
    async fn list_messages(&self, trip_id: Uuid) -> Result<Vec<TripMessage>, Error>;
    /// One entry per trip the user participates in, counting messages the user
    /// has not read and did not send. Trips with nothing unread report zero.
    async fn unread_counts(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>, Error>;

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>, Error>;
    /// Newest first, at most `limit` rows.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, Error>;
    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<i64, Error>;
}

/// A serializable read-modify-write unit. Dropping it without `commit` rolls back.
#[async_trait]
pub trait Tx: Send {
    async fn fetch_load_for_update(&mut self, id: Uuid) -> Result<Load, Error>;
    async fn insert_load(&mut self, load: &Load) -> Result<(), Error>;
    async fn update_load(&mut self, load: &Load) -> Result<(), Error>;

    async fn fetch_bid_for_update(&mut self, id: Uuid) -> Result<Bid, Error>;
    async fn fetch_bids_for_load_for_update(&mut self, load_id: Uuid) -> Result<Vec<Bid>, Error>;
    /// The carrier's non-withdrawn bid on the load, if any.
    async fn find_active_bid(
        &mut self,
        load_id: Uuid,
        carrier_id: Uuid,
    ) -> Result<Option<Bid>, Error>;
    /// Fails with a duplicate-bid error if the carrier already holds an active bid.
    async fn insert_bid(&mut self, bid: &Bid) -> Result<(), Error>;
    async fn update_bid(&mut self, bid: &Bid) -> Result<(), Error>;

    async fn fetch_trip(&mut self, id: Uuid) -> Result<Trip, Error>;
    async fn fetch_trip_for_update(&mut self, id: Uuid) -> Result<Trip, Error>;
    /// Fails with a conflict error if the load already has a live trip.
    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error>;
    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error>;

    async fn insert_tracking_event(&mut self, event: &TrackingEvent) -> Result<(), Error>;

    async fn fetch_message(&mut self, id: Uuid) -> Result<TripMessage, Error>;
    async fn insert_message(&mut self, message: &TripMessage) -> Result<(), Error>;
    /// Stamps unread messages on the trip not sent by the recipient, optionally
    /// only one of them. Returns how many rows changed.
    async fn mark_messages_read(
        &mut self,
        trip_id: Uuid,
        recipient_id: Uuid,
        message_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64, Error>;

    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), Error>;
    async fn mark_notifications_read(
        &mut self,
        user_id: Uuid,
        notification_id: Option<Uuid>,
    ) -> Result<u64, Error>;

    async fn commit(&mut self) -> Result<(), Error>;
}
