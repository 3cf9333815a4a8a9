use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, MessageAPI};
use crate::auth::User;
use crate::entities::{NewMessage, ReadTarget, TripMessage, UnreadSummary};
use crate::error::Error;

/// How many rows a mark-read call changed.
#[derive(Serialize, Deserialize)]
pub struct Marked {
    marked: u64,
}

impl From<u64> for Marked {
    fn from(marked: u64) -> Self {
        Self { marked }
    }
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(trip_id): Path<Uuid>,
    Json(params): Json<NewMessage>,
) -> Result<Json<TripMessage>, Error> {
    let message = api.send_message(user, trip_id, params).await?;

    Ok(message.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Vec<TripMessage>>, Error> {
    let messages = api.list_messages(user, trip_id).await?;

    Ok(messages.into())
}

pub async fn mark_read(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(trip_id): Path<Uuid>,
    Json(target): Json<ReadTarget>,
) -> Result<Json<Marked>, Error> {
    let marked = api.mark_messages_read(user, trip_id, target).await?;

    Ok(Marked::from(marked).into())
}

pub async fn unread(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<UnreadSummary>, Error> {
    let summary = api.unread_summary(user).await?;

    Ok(summary.into())
}
