use serde_json::Value;
use uuid::Uuid;

use super::Engine;
use crate::{
    entities::{Notification, NotificationKind},
    error::Error,
};

impl Engine {
    /// Trusted entry point that writes a notification for `user_id`.
    ///
    /// This bypasses the per-entity rules on purpose and is never reachable
    /// from the HTTP surface, so every call is recorded on the `audit` target.
    #[tracing::instrument(skip(self, payload))]
    pub async fn emit(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        payload: Value,
    ) -> Result<Notification, Error> {
        let notification = Notification::new(user_id, kind, payload);
        let row = &notification;

        self.with_retries("emit", move || async move {
            let mut tx = self.store.begin().await?;
            tx.insert_notification(row).await?;
            tx.commit().await
        })
        .await?;

        tracing::info!(
            target: "audit",
            notification_id = %notification.id,
            %user_id,
            kind = %kind.name(),
            "notification emitted"
        );

        Ok(notification)
    }

    /// Fan-out after a committed change. A failed notification is logged and
    /// never fails the change that caused it.
    pub(crate) async fn notify(&self, user_id: Uuid, kind: NotificationKind, payload: Value) {
        if let Err(err) = self.emit(user_id, kind, payload).await {
            tracing::warn!(%user_id, kind = %kind.name(), "could not emit notification: {}", err);
        }
    }
}
