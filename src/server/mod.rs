mod handlers;
mod identity;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch},
    Router,
};

use crate::api::{DynAPI, API};
use crate::error::{unexpected_error, Error};
use crate::server::handlers::{bids, loads, messages, notifications, trips};

pub use identity::{USER_ID_HEADER, USER_ROLE_HEADER};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/loads", get(loads::list).post(loads::create))
        .route("/loads/:id", get(loads::find))
        .route("/loads/:id/cancel", patch(loads::cancel))
        .route("/loads/:id/bids", get(bids::list_for_load).post(bids::create))
        .route("/loads/:id/bids/:bid_id/accept", patch(bids::accept))
        .route("/bids", get(bids::list_own))
        .route("/bids/:id/withdraw", patch(bids::withdraw))
        .route("/trips", get(trips::list))
        .route("/trips/:id", get(trips::find))
        .route("/trips/:id/status", patch(trips::advance))
        .route(
            "/trips/:id/events",
            get(trips::list_events).post(trips::record_event),
        )
        .route(
            "/trips/:id/messages",
            get(messages::list).post(messages::create),
        )
        .route("/trips/:id/messages/read", patch(messages::mark_read))
        .route("/messages/unread", get(messages::unread))
        .route("/notifications", get(notifications::list))
        .route("/notifications/read", patch(notifications::mark_read))
        .layer(Extension(api))
}

pub async fn serve<T: API + Sync + Send + 'static>(api: T, addr: SocketAddr) -> Result<(), Error> {
    let api = Arc::new(api) as DynAPI;
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!("server error: {}", err);
            unexpected_error()
        })
}
