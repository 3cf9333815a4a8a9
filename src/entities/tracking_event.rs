use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;
use crate::error::Error;

/// Immutable record of trip progress. Never updated once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub author_id: Uuid,
    pub event_type: EventType,
    pub coordinates: Option<Coordinates>,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewTrackingEvent {
    pub event_type: EventType,
    pub coordinates: Option<Coordinates>,
    pub photo_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PickedUp,
    Checkpoint,
    Delayed,
    Incident,
    Arrived,
    ProofOfDelivery,
    Note,
}

impl NewTrackingEvent {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(coordinates) = &self.coordinates {
            coordinates.validate()?;
        }

        Ok(())
    }
}

impl TrackingEvent {
    pub fn new(trip_id: Uuid, author_id: Uuid, params: NewTrackingEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            author_id,
            event_type: params.event_type,
            coordinates: params.coordinates,
            photo_url: params.photo_url,
            description: params.description,
            created_at: Utc::now(),
        }
    }
}

#[test]
fn tracking_event_rejects_bad_coordinates() {
    let params = NewTrackingEvent {
        event_type: EventType::Checkpoint,
        coordinates: Some(Coordinates {
            lat: 120.0,
            lng: 3.0,
        }),
        photo_url: None,
        description: None,
    };

    assert!(params.validate().unwrap_err().is_invalid_input_error());
}

#[test]
fn event_type_wire_names() {
    let name = serde_json::to_string(&EventType::ProofOfDelivery).unwrap();
    assert_eq!(name, "\"proof_of_delivery\"");
}
