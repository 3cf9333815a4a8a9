use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Role, User};
use crate::entities::{Bid, Load};
use crate::error::{forbidden_error, invalid_transition_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub load_id: Uuid,
    pub bid_id: Uuid,
    pub shipper_id: Uuid,
    pub carrier_id: Uuid,
    /// Accepted bid amount in minor currency units.
    pub agreed_amount: i64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Confirmed,
    InTransit,
    Delivered,
    Completed,
    Disputed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Confirmed => "confirmed".into(),
            Self::InTransit => "in_transit".into(),
            Self::Delivered => "delivered".into(),
            Self::Completed => "completed".into(),
            Self::Disputed => "disputed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Disputed | Self::Cancelled)
    }

    /// Messaging stays open after completion so post-delivery disputes can be discussed.
    pub fn allows_messaging(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

pub struct Transition {
    pub from: Status,
    pub to: Status,
    pub parties: &'static [Role],
}

/// Every permitted edge of the trip lifecycle and the parties allowed to take it.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Status::Pending,
        to: Status::Confirmed,
        parties: &[Role::Carrier],
    },
    Transition {
        from: Status::Confirmed,
        to: Status::InTransit,
        parties: &[Role::Carrier],
    },
    Transition {
        from: Status::InTransit,
        to: Status::Delivered,
        parties: &[Role::Carrier],
    },
    Transition {
        from: Status::Delivered,
        to: Status::Completed,
        parties: &[Role::Shipper],
    },
    Transition {
        from: Status::InTransit,
        to: Status::Disputed,
        parties: &[Role::Shipper, Role::Carrier],
    },
    Transition {
        from: Status::Delivered,
        to: Status::Disputed,
        parties: &[Role::Shipper, Role::Carrier],
    },
    Transition {
        from: Status::Pending,
        to: Status::Cancelled,
        parties: &[Role::Shipper],
    },
    Transition {
        from: Status::Confirmed,
        to: Status::Cancelled,
        parties: &[Role::Shipper, Role::Carrier],
    },
];

impl Trip {
    pub fn new(load: &Load, bid: &Bid) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            load_id: load.id,
            bid_id: bid.id,
            shipper_id: load.shipper_id,
            carrier_id: bid.carrier_id,
            agreed_amount: bid.amount,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The side of the trip the user is on, if any. The identity's role claim
    /// must agree with the relation.
    pub fn party_of(&self, user: &User) -> Option<Role> {
        match user.role {
            Role::Carrier if user.id == self.carrier_id => Some(Role::Carrier),
            Role::Shipper if user.id == self.shipper_id => Some(Role::Shipper),
            _ => None,
        }
    }

    /// The participant on the other side of `party`.
    pub fn counterpart(&self, party: Role) -> Uuid {
        match party {
            Role::Carrier => self.shipper_id,
            Role::Shipper => self.carrier_id,
        }
    }

    #[tracing::instrument]
    pub fn advance(&mut self, party: Role, to: Status) -> Result<(), Error> {
        let transition = TRANSITIONS
            .iter()
            .find(|t| t.from == self.status && t.to == to)
            .ok_or_else(invalid_transition_error)?;

        if !transition.parties.contains(&party) {
            tracing::info!("{:?} may not move a trip to {}", party, to.name());
            return Err(forbidden_error());
        }

        self.status = to;
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Idempotency key handed to the payment gateway when the trip settles.
    pub fn settlement_reference(&self) -> String {
        format!("trip_{}", self.id.simple())
    }
}

impl PolarClass for Trip {
    fn get_polar_class_builder() -> oso::ClassBuilder<Trip> {
        oso::Class::builder()
            .name("Trip")
            .add_attribute_getter("id", |recv: &Trip| recv.id.to_string())
            .add_attribute_getter("shipper_id", |recv: &Trip| recv.shipper_id.to_string())
            .add_attribute_getter("carrier_id", |recv: &Trip| recv.carrier_id.to_string())
            .add_attribute_getter("status", |recv: &Trip| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Trip::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
fn sample_trip() -> Trip {
    use crate::entities::NewBid;

    let load = Load::new(Uuid::new_v4(), crate::entities::load::sample_new_load());
    let bid = Bid::new(
        load.id,
        Uuid::new_v4(),
        NewBid {
            amount: 50_000,
            estimated_hours: 5,
            message: None,
        },
    );

    Trip::new(&load, &bid)
}

#[test]
fn trip_happy_path() {
    let mut trip = sample_trip();
    assert_eq!(trip.status, Status::Pending);
    assert_eq!(trip.agreed_amount, 50_000);

    trip.advance(Role::Carrier, Status::Confirmed).unwrap();
    trip.advance(Role::Carrier, Status::InTransit).unwrap();
    trip.advance(Role::Carrier, Status::Delivered).unwrap();
    trip.advance(Role::Shipper, Status::Completed).unwrap();

    assert!(trip.status.is_terminal());
    assert!(trip.status.allows_messaging());
}

#[test]
fn only_carrier_moves_the_cargo() {
    let mut trip = sample_trip();
    trip.advance(Role::Carrier, Status::Confirmed).unwrap();

    let err = trip.advance(Role::Shipper, Status::InTransit).unwrap_err();
    assert!(err.is_forbidden_error());
    assert_eq!(trip.status, Status::Confirmed);

    trip.advance(Role::Carrier, Status::InTransit).unwrap();
    let err = trip.advance(Role::Shipper, Status::Delivered).unwrap_err();
    assert!(err.is_forbidden_error());
}

#[test]
fn missing_edges_are_invalid_transitions() {
    let mut trip = sample_trip();

    // skipping a step
    let err = trip.advance(Role::Carrier, Status::InTransit).unwrap_err();
    assert!(err.is_invalid_transition_error());

    // disputes only once the cargo moves
    let err = trip.advance(Role::Shipper, Status::Disputed).unwrap_err();
    assert!(err.is_invalid_transition_error());

    trip.advance(Role::Carrier, Status::Confirmed).unwrap();
    trip.advance(Role::Carrier, Status::InTransit).unwrap();

    // cancellation closes once in transit
    let err = trip.advance(Role::Shipper, Status::Cancelled).unwrap_err();
    assert!(err.is_invalid_transition_error());

    trip.advance(Role::Shipper, Status::Disputed).unwrap();

    // terminal
    let err = trip.advance(Role::Carrier, Status::Delivered).unwrap_err();
    assert!(err.is_invalid_transition_error());
}

#[test]
fn only_shipper_cancels_pending_trip() {
    let mut trip = sample_trip();

    let err = trip.advance(Role::Carrier, Status::Cancelled).unwrap_err();
    assert!(err.is_forbidden_error());

    trip.advance(Role::Shipper, Status::Cancelled).unwrap();
    assert!(!trip.status.allows_messaging());
}

#[test]
fn party_requires_matching_role_claim() {
    let trip = sample_trip();

    let carrier = User::new(trip.carrier_id, Role::Carrier);
    let shipper = User::new(trip.shipper_id, Role::Shipper);
    let impostor = User::new(trip.carrier_id, Role::Shipper);
    let stranger = User::new(Uuid::new_v4(), Role::Carrier);

    assert_eq!(trip.party_of(&carrier), Some(Role::Carrier));
    assert_eq!(trip.party_of(&shipper), Some(Role::Shipper));
    assert_eq!(trip.party_of(&impostor), None);
    assert_eq!(trip.party_of(&stranger), None);

    assert_eq!(trip.counterpart(Role::Carrier), trip.shipper_id);
    assert_eq!(trip.counterpart(Role::Shipper), trip.carrier_id);
}

#[test]
fn every_terminal_status_has_no_outgoing_edge() {
    for transition in TRANSITIONS {
        assert!(!transition.from.is_terminal());
        assert!(!transition.parties.is_empty());
    }
}
