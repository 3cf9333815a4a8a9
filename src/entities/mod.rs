mod bid;
mod load;
mod location;
mod message;
mod notification;
mod tracking_event;
mod trip;

pub use bid::{Bid, NewBid, Scope as BidScope, Status as BidStatus};
pub use load::{Load, NewLoad, Status as LoadStatus};
#[cfg(test)]
pub(crate) use load::sample_new_load;
pub use location::Coordinates;
pub use message::{NewMessage, ReadTarget, TripMessage, UnreadSummary};
pub use notification::{
    Kind as NotificationKind, Notification, NotificationPage, NotificationQuery,
};
pub use tracking_event::{EventType as TrackingEventType, NewTrackingEvent, TrackingEvent};
pub use trip::{Status as TripStatus, Transition, Trip, TRANSITIONS};
