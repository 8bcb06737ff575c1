use crate::config::CheckoutConfig;
use crate::domain::cart::Cart;
use crate::domain::ports::PaymentBackend;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Error envelope returned by the storefront API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorResponse {
    status_code: u16,
    message: String,
    #[serde(default)]
    details: Option<String>,
}

/// Payment endpoint reached over HTTP.
#[derive(Clone)]
pub struct HttpPaymentBackend {
    client: reqwest::Client,
    config: CheckoutConfig,
}

impl HttpPaymentBackend {
    pub fn new(config: CheckoutConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CheckoutError::Backend(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaymentBackend for HttpPaymentBackend {
    async fn create_or_update_payment_intent(&self, cart_id: &str) -> Result<Cart> {
        let url = self.config.payments_endpoint(cart_id);
        debug!(%url, "requesting payment intent");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| CheckoutError::Backend(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CheckoutError::Backend(e.to_string()))?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<ApiErrorResponse>(&body) {
                Ok(envelope) => {
                    warn!(
                        status = envelope.status_code,
                        details = envelope.details.as_deref().unwrap_or_default(),
                        "payment intent request rejected"
                    );
                    envelope.message
                }
                Err(_) => format!("payment intent request failed with status {status}"),
            };
            return Err(CheckoutError::Backend(message));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}
