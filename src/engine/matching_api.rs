use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::MatchingAPI,
    auth::User,
    entities::{Bid, NotificationKind, Trip},
    error::{invalid_state_error, Error},
};

struct Acceptance {
    trip: Trip,
    winner: Bid,
    rejected: Vec<Bid>,
}

#[async_trait]
impl MatchingAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Trip, Error> {
        let actor = &user;

        let Acceptance {
            trip,
            winner,
            rejected,
        } = self
            .with_retries("accept_bid", move || {
                self.try_accept_bid(actor, load_id, bid_id)
            })
            .await?;

        self.notify(
            winner.carrier_id,
            NotificationKind::BidAccepted,
            json!({ "load_id": load_id, "bid_id": winner.id, "trip_id": trip.id }),
        )
        .await;

        join_all(rejected.iter().map(|bid| {
            self.notify(
                bid.carrier_id,
                NotificationKind::BidRejected,
                json!({ "load_id": load_id, "bid_id": bid.id }),
            )
        }))
        .await;

        Ok(trip)
    }
}

impl Engine {
    /// One read-verify-write pass of bid acceptance. Every row it decides on
    /// is read inside the transaction, so a concurrent acceptance makes either
    /// this commit or the other one fail.
    async fn try_accept_bid(
        &self,
        user: &User,
        load_id: Uuid,
        bid_id: Uuid,
    ) -> Result<Acceptance, Error> {
        let mut tx = self.store.begin().await?;

        let mut load = tx.fetch_load_for_update(load_id).await?;
        self.authorize(user.clone(), "accept_bid", load.clone())?;

        if !load.status.accepts_bids() {
            tracing::info!(status = %load.status.name(), "load is no longer accepting bids");
            return Err(invalid_state_error());
        }

        let mut winner = tx.fetch_bid_for_update(bid_id).await?;
        if winner.load_id != load.id {
            tracing::info!("bid belongs to another load");
            return Err(invalid_state_error());
        }

        winner.accept()?;
        load.assign()?;

        let siblings = tx.fetch_bids_for_load_for_update(load.id).await?;

        tx.update_bid(&winner).await?;

        let mut rejected = Vec::new();
        for mut bid in siblings {
            if bid.id == winner.id || !bid.is_pending() {
                continue;
            }

            bid.reject()?;
            tx.update_bid(&bid).await?;
            rejected.push(bid);
        }

        tx.update_load(&load).await?;

        let trip = Trip::new(&load, &winner);
        tx.insert_trip(&trip).await?;

        tx.commit().await?;

        tracing::info!(
            target: "audit",
            %load_id,
            bid_id = %winner.id,
            trip_id = %trip.id,
            rejected = rejected.len(),
            "bid accepted"
        );

        Ok(Acceptance {
            trip,
            winner,
            rejected,
        })
    }
}
