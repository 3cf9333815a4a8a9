use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, invalid_state_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub load_id: Uuid,
    pub carrier_id: Uuid,
    /// Offer in minor currency units.
    pub amount: i64,
    pub estimated_hours: i32,
    pub message: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewBid {
    pub amount: i64,
    pub estimated_hours: i32,
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

/// Which bids a listing covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Carrier(Uuid),
    Load(Uuid),
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Accepted => "accepted".into(),
            Self::Rejected => "rejected".into(),
            Self::Withdrawn => "withdrawn".into(),
        }
    }
}

impl NewBid {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount <= 0 || self.estimated_hours <= 0 {
            return Err(invalid_input_error());
        }

        Ok(())
    }
}

impl Bid {
    pub fn new(load_id: Uuid, carrier_id: Uuid, params: NewBid) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            load_id,
            carrier_id,
            amount: params.amount,
            estimated_hours: params.estimated_hours,
            message: params.message,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Counts against the one-bid-per-carrier-per-load limit.
    pub fn is_active(&self) -> bool {
        self.status != Status::Withdrawn
    }

    #[tracing::instrument]
    pub fn accept(&mut self) -> Result<(), Error> {
        self.leave_pending(Status::Accepted)
    }

    #[tracing::instrument]
    pub fn reject(&mut self) -> Result<(), Error> {
        self.leave_pending(Status::Rejected)
    }

    #[tracing::instrument]
    pub fn withdraw(&mut self) -> Result<(), Error> {
        self.leave_pending(Status::Withdrawn)
    }

    fn leave_pending(&mut self, status: Status) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = status;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }
}

impl PolarClass for Bid {
    fn get_polar_class_builder() -> oso::ClassBuilder<Bid> {
        oso::Class::builder()
            .name("Bid")
            .add_attribute_getter("id", |recv: &Bid| recv.id.to_string())
            .add_attribute_getter("load_id", |recv: &Bid| recv.load_id.to_string())
            .add_attribute_getter("carrier_id", |recv: &Bid| recv.carrier_id.to_string())
            .add_attribute_getter("status", |recv: &Bid| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Bid::get_polar_class_builder();
        builder.build()
    }
}

#[test]
fn new_bid_validation() {
    let valid = NewBid {
        amount: 50_000,
        estimated_hours: 5,
        message: None,
    };
    assert!(valid.validate().is_ok());

    let free = NewBid {
        amount: 0,
        ..valid.clone()
    };
    assert!(free.validate().unwrap_err().is_invalid_input_error());

    let instant = NewBid {
        estimated_hours: 0,
        ..valid
    };
    assert!(instant.validate().is_err());
}

#[test]
fn bid_leaves_pending_once() {
    let params = NewBid {
        amount: 45_000,
        estimated_hours: 6,
        message: Some("can load tomorrow".into()),
    };

    let mut bid = Bid::new(Uuid::new_v4(), Uuid::new_v4(), params);
    assert!(bid.is_pending());
    assert!(bid.is_active());

    bid.withdraw().unwrap();
    assert_eq!(bid.status, Status::Withdrawn);
    assert!(!bid.is_active());

    // withdrawing twice fails the second time
    assert!(bid.withdraw().unwrap_err().is_invalid_state_error());
    assert!(bid.accept().is_err());
    assert!(bid.reject().is_err());
}
