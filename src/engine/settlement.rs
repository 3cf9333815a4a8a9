use serde_json::json;

use super::Engine;
use crate::entities::{NotificationKind, Trip};

impl Engine {
    /// Starts payment for a completed trip and hands the checkout link to the
    /// shipper. Runs after the status change has committed and never undoes it.
    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    pub(crate) async fn settle(&self, trip: &Trip) {
        let gateway = match &self.payments {
            Some(gateway) => gateway,
            None => {
                tracing::info!(target: "audit", "no payment gateway configured, settlement skipped");
                return;
            }
        };

        let reference = trip.settlement_reference();

        tracing::info!(
            target: "audit",
            %reference,
            amount = trip.agreed_amount,
            "initializing settlement"
        );

        match gateway.initialize(trip.agreed_amount, &reference).await {
            Ok(authorization_url) => {
                self.notify(
                    trip.shipper_id,
                    NotificationKind::PaymentInitialized,
                    json!({
                        "trip_id": trip.id,
                        "reference": reference,
                        "amount": trip.agreed_amount,
                        "authorization_url": authorization_url,
                    }),
                )
                .await;
            }
            Err(err) => {
                tracing::warn!(%reference, "settlement could not be initialized: {}", err);
            }
        }
    }
}
