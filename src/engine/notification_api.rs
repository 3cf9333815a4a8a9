use async_trait::async_trait;

use super::Engine;
use crate::{
    api::NotificationAPI,
    auth::User,
    entities::{NotificationPage, NotificationQuery, ReadTarget},
    error::{not_found_error, Error},
};

#[async_trait]
impl NotificationAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn list_notifications(
        &self,
        user: User,
        query: NotificationQuery,
    ) -> Result<NotificationPage, Error> {
        let notifications = self
            .store
            .list_notifications(user.id, query.unread_only, query.page_limit())
            .await?;

        // counted separately so the page filter and limit never affect it
        let unread_count = self.store.count_unread_notifications(user.id).await?;

        Ok(NotificationPage {
            notifications,
            unread_count,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn mark_notifications_read(
        &self,
        user: User,
        target: ReadTarget,
    ) -> Result<u64, Error> {
        let notification_id = match target {
            ReadTarget::One(id) => {
                let notification = self
                    .store
                    .find_notification(id)
                    .await?
                    .ok_or_else(not_found_error)?;

                self.authorize(user.clone(), "mark_read", notification)?;

                Some(id)
            }
            ReadTarget::All => None,
        };

        let user_id = user.id;

        self.with_retries("mark_notifications_read", move || async move {
            let mut tx = self.store.begin().await?;
            let marked = tx.mark_notifications_read(user_id, notification_id).await?;
            tx.commit().await?;

            Ok(marked)
        })
        .await
    }
}
