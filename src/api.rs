use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::User;
use crate::db::LoadFilter;
use crate::entities::{
    Bid, BidScope, BidStatus, Load, NewBid, NewLoad, NewMessage, NewTrackingEvent,
    NotificationPage, NotificationQuery, ReadTarget, TrackingEvent, Trip, TripMessage,
    TripStatus, UnreadSummary,
};
use crate::error::Error;

#[async_trait]
pub trait LoadAPI {
    async fn post_load(&self, user: User, params: NewLoad) -> Result<Load, Error>;
    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error>;
    async fn list_loads(&self, user: User, filter: LoadFilter) -> Result<Vec<Load>, Error>;
    async fn cancel_load(&self, user: User, id: Uuid) -> Result<Load, Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn submit_bid(&self, user: User, load_id: Uuid, params: NewBid) -> Result<Bid, Error>;
    async fn withdraw_bid(&self, user: User, id: Uuid) -> Result<Bid, Error>;
    async fn list_bids(
        &self,
        user: User,
        scope: BidScope,
        status: Option<BidStatus>,
    ) -> Result<Vec<Bid>, Error>;
}

#[async_trait]
pub trait MatchingAPI {
    /// Accepts one pending bid, rejects its siblings and opens the trip in a
    /// single transaction.
    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Trip, Error>;
}

#[async_trait]
pub trait TripAPI {
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn list_trips(&self, user: User) -> Result<Vec<Trip>, Error>;
    async fn advance_status(&self, user: User, id: Uuid, to: TripStatus) -> Result<Trip, Error>;
    async fn record_tracking_event(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewTrackingEvent,
    ) -> Result<TrackingEvent, Error>;
    async fn list_tracking_events(
        &self,
        user: User,
        trip_id: Uuid,
    ) -> Result<Vec<TrackingEvent>, Error>;
}

#[async_trait]
pub trait MessageAPI {
    async fn send_message(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewMessage,
    ) -> Result<TripMessage, Error>;
    async fn list_messages(&self, user: User, trip_id: Uuid) -> Result<Vec<TripMessage>, Error>;
    async fn mark_messages_read(
        &self,
        user: User,
        trip_id: Uuid,
        target: ReadTarget,
    ) -> Result<u64, Error>;
    async fn unread_summary(&self, user: User) -> Result<UnreadSummary, Error>;
}

#[async_trait]
pub trait NotificationAPI {
    async fn list_notifications(
        &self,
        user: User,
        query: NotificationQuery,
    ) -> Result<NotificationPage, Error>;
    async fn mark_notifications_read(&self, user: User, target: ReadTarget)
        -> Result<u64, Error>;
}

pub trait API: LoadAPI + BidAPI + MatchingAPI + TripAPI + MessageAPI + NotificationAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
