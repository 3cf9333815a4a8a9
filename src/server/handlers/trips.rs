use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, TripAPI};
use crate::auth::User;
use crate::entities::{NewTrackingEvent, TrackingEvent, Trip, TripStatus};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct AdvanceParams {
    status: TripStatus,
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<Trip>>, Error> {
    let trips = api.list_trips(user).await?;

    Ok(trips.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.find_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn advance(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<AdvanceParams>,
) -> Result<Json<Trip>, Error> {
    let trip = api.advance_status(user, id, params.status).await?;

    Ok(trip.into())
}

pub async fn record_event(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<NewTrackingEvent>,
) -> Result<Json<TrackingEvent>, Error> {
    let event = api.record_tracking_event(user, id, params).await?;

    Ok(event.into())
}

pub async fn list_events(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, Error> {
    let events = api.list_tracking_events(user, id).await?;

    Ok(events.into())
}
