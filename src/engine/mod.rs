mod bid_api;
mod fanout;
mod load_api;
mod matching_api;
mod message_api;
mod notification_api;
mod settlement;
mod trip_api;

use std::future::Future;
use std::time::Duration;

use oso::Oso;
use rand::Rng;

use crate::{
    api::API,
    auth::authorizor,
    db::Store,
    error::{forbidden_error, Error},
    external::PaymentGateway,
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

const BACKOFF_BASE_MS: u64 = 10;

pub struct Engine {
    store: Box<dyn Store>,
    authorizor: Oso,
    payments: Option<Box<dyn PaymentGateway>>,
    max_retries: u32,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: Box<dyn Store>) -> Result<Self, Error> {
        Ok(Self {
            store,
            authorizor: authorizor::new()?,
            payments: None,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_payment_gateway(mut self, payments: Box<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// How many times a transaction that lost a serialization race is re-run
    /// before the conflict is surfaced.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(forbidden_error())
    }

    /// Runs one read-verify-write attempt, re-running it from scratch while it
    /// fails with a conflict, at most `max_retries` more times.
    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;

        loop {
            match attempt().await {
                Err(err) if err.is_conflict_error() && retries < self.max_retries => {
                    retries += 1;
                    let delay = backoff(retries);

                    tracing::info!(operation, retries, "conflict, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_conflict_error() => {
                    tracing::warn!(operation, retries, "giving up after repeated conflicts");
                    return Err(err);
                }
                result => return result,
            }
        }
    }
}

/// Exponential backoff with full jitter on top of the base delay.
fn backoff(retry: u32) -> Duration {
    let base = BACKOFF_BASE_MS << retry.saturating_sub(1).min(6);
    let jitter = rand::thread_rng().gen_range(0..=base);

    Duration::from_millis(base + jitter)
}

impl API for Engine {}

#[test]
fn backoff_grows_and_stays_bounded() {
    for retry in 1..=3 {
        let base = BACKOFF_BASE_MS << (retry - 1);
        let delay = backoff(retry).as_millis() as u64;
        assert!(delay >= base && delay <= 2 * base, "retry {} slept {}", retry, delay);
    }

    assert!(backoff(50) <= Duration::from_millis(2 * (BACKOFF_BASE_MS << 6)));
}

#[test]
fn conflicts_are_retried_then_surfaced() {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::db::MemoryStore;
    use crate::error::{conflict_error, invalid_state_error};

    let engine = Engine::new(Box::new(MemoryStore::new()))
        .unwrap()
        .with_max_retries(2);

    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result: Result<(), Error> = tokio_test::block_on(engine.with_retries("test", move || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(conflict_error())
    }));
    assert!(result.unwrap_err().is_conflict_error());
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    // anything but a conflict ends the loop at once
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result: Result<(), Error> = tokio_test::block_on(engine.with_retries("test", move || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(invalid_state_error())
    }));
    assert!(result.unwrap_err().is_invalid_state_error());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
