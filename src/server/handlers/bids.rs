use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{BidAPI, DynAPI, MatchingAPI};
use crate::auth::User;
use crate::entities::{Bid, BidScope, BidStatus, NewBid, Trip};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct StatusFilter {
    status: Option<BidStatus>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
    Json(params): Json<NewBid>,
) -> Result<Json<Bid>, Error> {
    let bid = api.submit_bid(user, load_id, params).await?;

    Ok(bid.into())
}

pub async fn list_for_load(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api
        .list_bids(user, BidScope::Load(load_id), filter.status)
        .await?;

    Ok(bids.into())
}

pub async fn list_own(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Bid>>, Error> {
    let scope = BidScope::Carrier(user.id);
    let bids = api.list_bids(user, scope, filter.status).await?;

    Ok(bids.into())
}

pub async fn withdraw(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, Error> {
    let bid = api.withdraw_bid(user, id).await?;

    Ok(bid.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path((load_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Trip>, Error> {
    let trip = api.accept_bid(user, load_id, bid_id).await?;

    Ok(trip.into())
}
