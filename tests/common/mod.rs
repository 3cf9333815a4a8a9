#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use freightline::api::{BidAPI, LoadAPI, MatchingAPI};
use freightline::auth::{Role, User};
use freightline::db::MemoryStore;
use freightline::engine::Engine;
use freightline::entities::{Bid, Load, NewBid, NewLoad, Trip};
use freightline::error::{upstream_error, Error};
use freightline::external::PaymentGateway;

/// Payment gateway double that records every initialization.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    pub calls: Arc<Mutex<Vec<(i64, String)>>>,
    pub failing: bool,
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn initialize(&self, amount: i64, reference: &str) -> Result<String, Error> {
        self.calls.lock().unwrap().push((amount, reference.to_string()));

        if self.failing {
            return Err(upstream_error());
        }

        Ok(format!("https://checkout.test/{}", reference))
    }
}

pub fn engine() -> Engine {
    Engine::new(Box::new(MemoryStore::new())).unwrap()
}

pub fn engine_with_gateway(gateway: RecordingGateway) -> Engine {
    engine().with_payment_gateway(Box::new(gateway))
}

pub fn shipper() -> User {
    User::new(Uuid::new_v4(), Role::Shipper)
}

pub fn carrier() -> User {
    User::new(Uuid::new_v4(), Role::Carrier)
}

pub fn new_load() -> NewLoad {
    NewLoad {
        origin: "Lagos".into(),
        destination: "Ibadan".into(),
        cargo: "bagged rice".into(),
        weight_kg: 15_000.0,
        budget: 55_000,
        pickup_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
    }
}

pub fn new_bid(amount: i64, estimated_hours: i32) -> NewBid {
    NewBid {
        amount,
        estimated_hours,
        message: None,
    }
}

pub async fn post_load(engine: &Engine, shipper: &User) -> Load {
    engine.post_load(shipper.clone(), new_load()).await.unwrap()
}

pub async fn bid(engine: &Engine, carrier: &User, load: &Load, amount: i64) -> Bid {
    engine
        .submit_bid(carrier.clone(), load.id, new_bid(amount, 5))
        .await
        .unwrap()
}

/// Posts a load, takes one bid and accepts it.
pub async fn open_trip(engine: &Engine, shipper: &User, carrier: &User) -> Trip {
    let load = post_load(engine, shipper).await;
    let bid = bid(engine, carrier, &load, 50_000).await;

    engine
        .accept_bid(shipper.clone(), load.id, bid.id)
        .await
        .unwrap()
}
