use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::PaymentConfig,
    error::{invalid_input_error, upstream_error, Error},
};

/// Starts a hosted checkout for a settled trip.
///
/// `reference` identifies the settlement. The gateway treats a repeated
/// reference as the same transaction, so callers may retry freely.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the URL the payer is redirected to.
    async fn initialize(&self, amount: i64, reference: &str) -> Result<String, Error>;
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    amount: i64,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct Response<T> {
    status: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    authorization_url: String,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base,
            api_key: config.api_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self))]
    async fn initialize(&self, amount: i64, reference: &str) -> Result<String, Error> {
        let url = format!("https://{}/transaction/initialize", self.api_base);

        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&InitializeRequest { amount, reference })
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            tracing::warn!("payment gateway rejected {}: {}", reference, status_code);
            return Err(invalid_input_error());
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let data: Response<Authorization> = res.json().await?;

        if !data.status {
            return Err(upstream_error());
        }

        let authorization = data.data.ok_or_else(upstream_error)?;

        Ok(authorization.authorization_url)
    }
}
