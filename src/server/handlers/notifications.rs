use axum::extract::{Extension, Json, Query};

use crate::api::{DynAPI, NotificationAPI};
use crate::auth::User;
use crate::entities::{NotificationPage, NotificationQuery, ReadTarget};
use crate::error::Error;
use crate::server::handlers::messages::Marked;

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, Error> {
    let page = api.list_notifications(user, query).await?;

    Ok(page.into())
}

pub async fn mark_read(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(target): Json<ReadTarget>,
) -> Result<Json<Marked>, Error> {
    let marked = api.mark_notifications_read(user, target).await?;

    Ok(Marked::from(marked).into())
}
