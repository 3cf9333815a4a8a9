use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::TripAPI,
    auth::{Platform, Role, User},
    entities::{NewTrackingEvent, NotificationKind, TrackingEvent, Trip, TripStatus},
    error::{forbidden_error, invalid_state_error, not_found_error, Error},
};

#[async_trait]
impl TripAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self
            .store
            .find_trip(id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", trip.clone())?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn list_trips(&self, user: User) -> Result<Vec<Trip>, Error> {
        self.authorize(user.clone(), "list_own_trips", Platform::default())?;

        self.store.list_trips_for_user(user.id).await
    }

    #[tracing::instrument(skip(self))]
    async fn advance_status(&self, user: User, id: Uuid, to: TripStatus) -> Result<Trip, Error> {
        let actor = &user;

        let (trip, party) = self
            .with_retries("advance_status", move || self.try_advance(actor, id, to))
            .await?;

        self.notify(
            trip.counterpart(party),
            NotificationKind::TripStatusChanged,
            json!({ "trip_id": trip.id, "status": trip.status.name() }),
        )
        .await;

        if trip.status == TripStatus::Completed {
            self.settle(&trip).await;
        }

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn record_tracking_event(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewTrackingEvent,
    ) -> Result<TrackingEvent, Error> {
        let (actor, params) = (&user, &params);

        self.with_retries("record_tracking_event", move || async move {
            let mut tx = self.store.begin().await?;

            let trip = tx.fetch_trip_for_update(trip_id).await?;
            self.authorize(actor.clone(), "record_tracking_event", trip.clone())?;

            params.validate()?;

            if trip.status.is_terminal() {
                tracing::info!(status = %trip.status.name(), "trip is closed to tracking");
                return Err(invalid_state_error());
            }

            let event = TrackingEvent::new(trip.id, actor.id, params.clone());
            tx.insert_tracking_event(&event).await?;
            tx.commit().await?;

            Ok(event)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_tracking_events(
        &self,
        user: User,
        trip_id: Uuid,
    ) -> Result<Vec<TrackingEvent>, Error> {
        let trip = self
            .store
            .find_trip(trip_id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", trip)?;

        self.store.list_tracking_events(trip_id).await
    }
}

impl Engine {
    async fn try_advance(
        &self,
        user: &User,
        id: Uuid,
        to: TripStatus,
    ) -> Result<(Trip, Role), Error> {
        let mut tx = self.store.begin().await?;

        let mut trip = tx.fetch_trip_for_update(id).await?;
        self.authorize(user.clone(), "advance_status", trip.clone())?;

        let party = trip.party_of(user).ok_or_else(forbidden_error)?;
        trip.advance(party, to)?;

        // the load closes together with its trip
        match to {
            TripStatus::Completed => {
                let mut load = tx.fetch_load_for_update(trip.load_id).await?;
                load.complete()?;
                tx.update_load(&load).await?;
            }
            TripStatus::Cancelled => {
                let mut load = tx.fetch_load_for_update(trip.load_id).await?;
                load.cancel_assignment()?;
                tx.update_load(&load).await?;
            }
            _ => {}
        }

        tx.update_trip(&trip).await?;
        tx.commit().await?;

        tracing::info!(trip_id = %trip.id, status = %trip.status.name(), "trip advanced");

        Ok((trip, party))
    }
}
