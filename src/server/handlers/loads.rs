use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::{DynAPI, LoadAPI};
use crate::auth::{Role, User};
use crate::db::LoadFilter;
use crate::entities::{Load, NewLoad};
use crate::error::Error;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewLoad>,
) -> Result<Json<Load>, Error> {
    let load = api.post_load(user, params).await?;

    Ok(load.into())
}

/// Carriers browse the open market, shippers see their own loads.
pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<Load>>, Error> {
    let filter = match user.role {
        Role::Carrier => LoadFilter::AcceptingBids,
        Role::Shipper => LoadFilter::Shipper(user.id),
    };

    let loads = api.list_loads(user, filter).await?;

    Ok(loads.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.find_load(user, id).await?;

    Ok(load.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.cancel_load(user, id).await?;

    Ok(load.into())
}
