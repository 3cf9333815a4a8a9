use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::LoadAPI,
    auth::{Platform, User},
    db::LoadFilter,
    entities::{Bid, Load, NewLoad, NotificationKind},
    error::{forbidden_error, not_found_error, Error},
};

#[async_trait]
impl LoadAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn post_load(&self, user: User, params: NewLoad) -> Result<Load, Error> {
        self.authorize(user.clone(), "post_load", Platform::default())?;
        params.validate()?;

        let load = Load::new(user.id, params);
        let row = &load;

        self.with_retries("post_load", move || async move {
            let mut tx = self.store.begin().await?;
            tx.insert_load(row).await?;
            tx.commit().await
        })
        .await?;

        tracing::info!(load_id = %load.id, "load posted");

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let load = self
            .store
            .find_load(id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", load.clone())?;

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn list_loads(&self, user: User, filter: LoadFilter) -> Result<Vec<Load>, Error> {
        self.authorize(user.clone(), "browse_loads", Platform::default())?;

        if let LoadFilter::Shipper(shipper_id) = filter {
            if !user.is_shipper() || shipper_id != user.id {
                return Err(forbidden_error());
            }
        }

        self.store.list_loads(filter).await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let actor = &user;

        let (load, rejected) = self
            .with_retries("cancel_load", move || self.try_cancel_load(actor, id))
            .await?;

        join_all(rejected.iter().map(|bid| {
            self.notify(
                bid.carrier_id,
                NotificationKind::LoadCancelled,
                json!({ "load_id": load.id, "bid_id": bid.id }),
            )
        }))
        .await;

        Ok(load)
    }
}

impl Engine {
    async fn try_cancel_load(&self, user: &User, id: Uuid) -> Result<(Load, Vec<Bid>), Error> {
        let mut tx = self.store.begin().await?;

        let mut load = tx.fetch_load_for_update(id).await?;
        self.authorize(user.clone(), "cancel", load.clone())?;

        load.withdraw()?;

        let mut rejected = Vec::new();
        for mut bid in tx.fetch_bids_for_load_for_update(id).await? {
            if !bid.is_pending() {
                continue;
            }

            bid.reject()?;
            tx.update_bid(&bid).await?;
            rejected.push(bid);
        }

        tx.update_load(&load).await?;
        tx.commit().await?;

        tracing::info!(
            target: "audit",
            load_id = %load.id,
            rejected = rejected.len(),
            "load cancelled, pending bids rejected"
        );

        Ok((load, rejected))
    }
}
