use chrono::{DateTime, NaiveDate, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, invalid_state_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub id: Uuid,
    pub shipper_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub cargo: String,
    pub weight_kg: f64,
    /// Budget in minor currency units.
    pub budget: i64,
    pub pickup_date: NaiveDate,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewLoad {
    pub origin: String,
    pub destination: String,
    pub cargo: String,
    pub weight_kg: f64,
    pub budget: i64,
    pub pickup_date: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    Bidding,
    Assigned,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Open => "open".into(),
            Self::Bidding => "bidding".into(),
            Self::Assigned => "assigned".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    pub fn accepts_bids(&self) -> bool {
        matches!(self, Self::Open | Self::Bidding)
    }
}

impl NewLoad {
    pub fn validate(&self) -> Result<(), Error> {
        let blank = [&self.origin, &self.destination, &self.cargo]
            .iter()
            .any(|field| field.trim().is_empty());

        if blank || !(self.weight_kg > 0.0) || self.budget <= 0 {
            return Err(invalid_input_error());
        }

        Ok(())
    }
}

impl Load {
    pub fn new(shipper_id: Uuid, params: NewLoad) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            shipper_id,
            origin: params.origin,
            destination: params.destination,
            cargo: params.cargo,
            weight_kg: params.weight_kg,
            budget: params.budget,
            pickup_date: params.pickup_date,
            status: Status::Open,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves an `open` load into `bidding`. Returns whether the status changed.
    pub fn start_bidding(&mut self) -> Result<bool, Error> {
        match self.status {
            Status::Open => {
                self.set_status(Status::Bidding);
                Ok(true)
            }
            Status::Bidding => Ok(false),
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn assign(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::Bidding => {
                self.set_status(Status::Assigned);
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Assigned => {
                self.set_status(Status::Completed);
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    /// Withdraws a load from the market before any bid was accepted.
    #[tracing::instrument]
    pub fn withdraw(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::Bidding => {
                self.set_status(Status::Cancelled);
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    /// Cancels an assigned load whose trip was called off.
    #[tracing::instrument]
    pub fn cancel_assignment(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Assigned => {
                self.set_status(Status::Cancelled);
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

impl PolarClass for Load {
    fn get_polar_class_builder() -> oso::ClassBuilder<Load> {
        oso::Class::builder()
            .name("Load")
            .add_attribute_getter("id", |recv: &Load| recv.id.to_string())
            .add_attribute_getter("shipper_id", |recv: &Load| recv.shipper_id.to_string())
            .add_attribute_getter("status", |recv: &Load| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Load::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
pub(crate) fn sample_new_load() -> NewLoad {
    NewLoad {
        origin: "Lagos".into(),
        destination: "Kano".into(),
        cargo: "cement".into(),
        weight_kg: 12_000.0,
        budget: 60_000,
        pickup_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
    }
}

#[test]
fn new_load_validation() {
    assert!(sample_new_load().validate().is_ok());

    let mut blank_origin = sample_new_load();
    blank_origin.origin = "  ".into();
    assert!(blank_origin.validate().unwrap_err().is_invalid_input_error());

    let mut weightless = sample_new_load();
    weightless.weight_kg = 0.0;
    assert!(weightless.validate().is_err());

    let mut nan_weight = sample_new_load();
    nan_weight.weight_kg = f64::NAN;
    assert!(nan_weight.validate().is_err());

    let mut free = sample_new_load();
    free.budget = 0;
    assert!(free.validate().is_err());
}

#[test]
fn load_lifecycle() {
    let mut load = Load::new(Uuid::new_v4(), sample_new_load());
    assert_eq!(load.status, Status::Open);

    assert_eq!(load.start_bidding().unwrap(), true);
    assert_eq!(load.start_bidding().unwrap(), false);
    assert_eq!(load.status, Status::Bidding);

    load.assign().unwrap();
    assert_eq!(load.status, Status::Assigned);

    // assigned exactly once
    assert!(load.assign().unwrap_err().is_invalid_state_error());
    assert!(load.start_bidding().is_err());
    assert!(load.withdraw().is_err());

    load.complete().unwrap();
    assert_eq!(load.status, Status::Completed);
    assert!(load.cancel_assignment().is_err());
}

#[test]
fn load_withdraw_only_before_assignment() {
    let mut load = Load::new(Uuid::new_v4(), sample_new_load());
    load.withdraw().unwrap();
    assert_eq!(load.status, Status::Cancelled);
    assert!(!load.status.accepts_bids());

    let mut assigned = Load::new(Uuid::new_v4(), sample_new_load());
    assigned.assign().unwrap();
    assert!(assigned.withdraw().is_err());
    assigned.cancel_assignment().unwrap();
    assert_eq!(assigned.status, Status::Cancelled);
}
