use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::MessageAPI,
    auth::User,
    entities::{NewMessage, NotificationKind, ReadTarget, TripMessage, UnreadSummary},
    error::{forbidden_error, invalid_state_error, not_found_error, Error},
};

#[async_trait]
impl MessageAPI for Engine {
    #[tracing::instrument(skip(self, params))]
    async fn send_message(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewMessage,
    ) -> Result<TripMessage, Error> {
        let (actor, params) = (&user, &params);

        let (recipient_id, message) = self
            .with_retries("send_message", move || self.try_send_message(actor, trip_id, params))
            .await?;

        self.notify(
            recipient_id,
            NotificationKind::NewMessage,
            json!({ "trip_id": trip_id, "message_id": message.id, "sender_id": user.id }),
        )
        .await;

        Ok(message)
    }

    #[tracing::instrument(skip(self))]
    async fn list_messages(&self, user: User, trip_id: Uuid) -> Result<Vec<TripMessage>, Error> {
        let trip = self
            .store
            .find_trip(trip_id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read_messages", trip)?;

        self.store.list_messages(trip_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn mark_messages_read(
        &self,
        user: User,
        trip_id: Uuid,
        target: ReadTarget,
    ) -> Result<u64, Error> {
        let actor = &user;

        self.with_retries("mark_messages_read", move || async move {
            let mut tx = self.store.begin().await?;

            let trip = tx.fetch_trip(trip_id).await?;
            self.authorize(actor.clone(), "read_messages", trip.clone())?;

            let message_id = match target {
                ReadTarget::One(id) => {
                    let message = tx.fetch_message(id).await?;
                    if message.trip_id != trip.id {
                        return Err(not_found_error());
                    }

                    Some(id)
                }
                ReadTarget::All => None,
            };

            let marked = tx
                .mark_messages_read(trip.id, actor.id, message_id, Utc::now())
                .await?;
            tx.commit().await?;

            Ok(marked)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn unread_summary(&self, user: User) -> Result<UnreadSummary, Error> {
        let counts = self.store.unread_counts(user.id).await?;

        Ok(UnreadSummary::from_counts(counts))
    }
}

impl Engine {
    async fn try_send_message(
        &self,
        user: &User,
        trip_id: Uuid,
        params: &NewMessage,
    ) -> Result<(Uuid, TripMessage), Error> {
        let mut tx = self.store.begin().await?;

        let trip = tx.fetch_trip(trip_id).await?;
        self.authorize(user.clone(), "send_message", trip.clone())?;
        let party = trip.party_of(user).ok_or_else(forbidden_error)?;

        params.validate()?;

        if !trip.status.allows_messaging() {
            tracing::info!(status = %trip.status.name(), "trip is closed to messaging");
            return Err(invalid_state_error());
        }

        let message = TripMessage::new(trip.id, user.id, params.clone());
        tx.insert_message(&message).await?;
        tx.commit().await?;

        Ok((trip.counterpart(party), message))
    }
}
