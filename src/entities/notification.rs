use std::str::FromStr;

use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, Error};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: Kind,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    BidReceived,
    BidAccepted,
    BidRejected,
    LoadCancelled,
    TripStatusChanged,
    NewMessage,
    PaymentInitialized,
}

impl Kind {
    pub fn name(&self) -> String {
        match self {
            Self::BidReceived => "bid_received".into(),
            Self::BidAccepted => "bid_accepted".into(),
            Self::BidRejected => "bid_rejected".into(),
            Self::LoadCancelled => "load_cancelled".into(),
            Self::TripStatusChanged => "trip_status_changed".into(),
            Self::NewMessage => "new_message".into(),
            Self::PaymentInitialized => "payment_initialized".into(),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bid_received" => Ok(Self::BidReceived),
            "bid_accepted" => Ok(Self::BidAccepted),
            "bid_rejected" => Ok(Self::BidRejected),
            "load_cancelled" => Ok(Self::LoadCancelled),
            "trip_status_changed" => Ok(Self::TripStatusChanged),
            "new_message" => Ok(Self::NewMessage),
            "payment_initialized" => Ok(Self::PaymentInitialized),
            _ => Err(invalid_input_error()),
        }
    }
}

impl Notification {
    pub fn new(user_id: Uuid, kind: Kind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            payload,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

impl PolarClass for Notification {
    fn get_polar_class_builder() -> oso::ClassBuilder<Notification> {
        oso::Class::builder()
            .name("Notification")
            .add_attribute_getter("id", |recv: &Notification| recv.id.to_string())
            .add_attribute_getter("user_id", |recv: &Notification| recv.user_id.to_string())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Notification::get_polar_class_builder();
        builder.build()
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

impl NotificationQuery {
    pub fn page_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

/// A newest-first page of notifications plus the user's full unread count,
/// which never depends on the page filter or limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[test]
fn kind_names_round_trip_through_from_str() {
    let kinds = [
        Kind::BidReceived,
        Kind::BidAccepted,
        Kind::BidRejected,
        Kind::LoadCancelled,
        Kind::TripStatusChanged,
        Kind::NewMessage,
        Kind::PaymentInitialized,
    ];

    for kind in kinds {
        assert_eq!(kind.name().parse::<Kind>().unwrap(), kind);
    }

    assert!("bid_exploded".parse::<Kind>().is_err());
}

#[test]
fn page_limit_is_clamped() {
    assert_eq!(NotificationQuery::default().page_limit(), DEFAULT_PAGE_LIMIT);

    let huge = NotificationQuery {
        unread_only: false,
        limit: Some(10_000),
    };
    assert_eq!(huge.page_limit(), MAX_PAGE_LIMIT);

    let negative = NotificationQuery {
        unread_only: true,
        limit: Some(-3),
    };
    assert_eq!(negative.page_limit(), 1);
}
