use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripMessage {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub attachment_url: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewMessage {
    pub body: String,
    pub attachment_url: Option<String>,
}

/// Which of a user's items a mark-read call targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum ReadTarget {
    One(Uuid),
    All,
}

impl NewMessage {
    pub fn validate(&self) -> Result<(), Error> {
        if self.body.trim().is_empty() && self.attachment_url.is_none() {
            return Err(invalid_input_error());
        }

        Ok(())
    }
}

impl TripMessage {
    pub fn new(trip_id: Uuid, sender_id: Uuid, params: NewMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            sender_id,
            body: params.body,
            attachment_url: params.attachment_url,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_unread_by(&self, user_id: Uuid) -> bool {
        self.read_at.is_none() && self.sender_id != user_id
    }

    /// Stamps the message as read by `recipient_id`. Senders never mark their own
    /// messages and an existing stamp is kept. Returns whether anything changed.
    pub fn mark_read(&mut self, recipient_id: Uuid, at: DateTime<Utc>) -> bool {
        if !self.is_unread_by(recipient_id) {
            return false;
        }

        self.read_at = Some(at);
        true
    }
}

/// Unread message counts for one user, trip by trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnreadSummary {
    pub trips: BTreeMap<Uuid, i64>,
    pub total: i64,
}

impl UnreadSummary {
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, i64)>,
    {
        let mut summary = Self::default();

        for (trip_id, count) in counts {
            *summary.trips.entry(trip_id).or_insert(0) += count;
            summary.total += count;
        }

        summary
    }
}

#[test]
fn mark_read_is_idempotent_and_skips_sender() {
    let sender = Uuid::new_v4();
    let recipient = Uuid::new_v4();
    let params = NewMessage {
        body: "loaded and leaving the depot".into(),
        attachment_url: None,
    };

    let mut message = TripMessage::new(Uuid::new_v4(), sender, params);

    assert!(!message.mark_read(sender, Utc::now()));
    assert!(message.read_at.is_none());

    let first = Utc::now();
    assert!(message.mark_read(recipient, first));
    assert!(!message.mark_read(recipient, first + chrono::Duration::seconds(5)));
    assert_eq!(message.read_at, Some(first));
}

#[test]
fn empty_message_needs_attachment() {
    let empty = NewMessage {
        body: " ".into(),
        attachment_url: None,
    };
    assert!(empty.validate().is_err());

    let photo_only = NewMessage {
        body: "".into(),
        attachment_url: Some("https://files.example/waybill.jpg".into()),
    };
    assert!(photo_only.validate().is_ok());
}

#[test]
fn unread_summary_totals_match() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let summary = UnreadSummary::from_counts(vec![(a, 2), (b, 0)]);
    assert_eq!(summary.trips.len(), 2);
    assert_eq!(summary.total, summary.trips.values().sum::<i64>());
    assert_eq!(summary.total, 2);

    let empty = UnreadSummary::from_counts(Vec::new());
    assert!(empty.trips.is_empty());
    assert_eq!(empty.total, 0);
}
