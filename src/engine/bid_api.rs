use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::BidAPI,
    auth::{Platform, User},
    entities::{Bid, BidScope, BidStatus, Load, NewBid, NotificationKind},
    error::{duplicate_bid_error, forbidden_error, invalid_state_error, not_found_error, Error},
};

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn submit_bid(&self, user: User, load_id: Uuid, params: NewBid) -> Result<Bid, Error> {
        let (actor, params) = (&user, &params);

        let (load, bid) = self
            .with_retries("submit_bid", move || self.try_submit_bid(actor, load_id, params))
            .await?;

        self.notify(
            load.shipper_id,
            NotificationKind::BidReceived,
            json!({
                "load_id": load.id,
                "bid_id": bid.id,
                "carrier_id": bid.carrier_id,
                "amount": bid.amount,
            }),
        )
        .await;

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn withdraw_bid(&self, user: User, id: Uuid) -> Result<Bid, Error> {
        let actor = &user;

        self.with_retries("withdraw_bid", move || async move {
            let mut tx = self.store.begin().await?;

            let mut bid = tx.fetch_bid_for_update(id).await?;
            self.authorize(actor.clone(), "withdraw", bid.clone())?;

            bid.withdraw()?;

            tx.update_bid(&bid).await?;
            tx.commit().await?;

            Ok(bid)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(
        &self,
        user: User,
        scope: BidScope,
        status: Option<BidStatus>,
    ) -> Result<Vec<Bid>, Error> {
        match scope {
            BidScope::Carrier(carrier_id) => {
                self.authorize(user.clone(), "list_own_bids", Platform::default())?;

                if carrier_id != user.id {
                    return Err(forbidden_error());
                }
            }
            BidScope::Load(load_id) => {
                let load = self
                    .store
                    .find_load(load_id)
                    .await?
                    .ok_or_else(not_found_error)?;

                self.authorize(user, "list_bids", load)?;
            }
        }

        self.store.list_bids(scope, status).await
    }
}

impl Engine {
    async fn try_submit_bid(
        &self,
        user: &User,
        load_id: Uuid,
        params: &NewBid,
    ) -> Result<(Load, Bid), Error> {
        let mut tx = self.store.begin().await?;

        let mut load = tx.fetch_load_for_update(load_id).await?;
        self.authorize(user.clone(), "submit_bid", load.clone())?;

        params.validate()?;

        if !load.status.accepts_bids() {
            tracing::info!(status = %load.status.name(), "load is not accepting bids");
            return Err(invalid_state_error());
        }

        if tx.find_active_bid(load.id, user.id).await?.is_some() {
            return Err(duplicate_bid_error());
        }

        let bid = Bid::new(load.id, user.id, params.clone());
        tx.insert_bid(&bid).await?;

        if load.start_bidding()? {
            tx.update_load(&load).await?;
        }

        tx.commit().await?;

        Ok((load, bid))
    }
}
