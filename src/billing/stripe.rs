//! Stripe REST client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::billing::{Customer, PaymentProvider};
use crate::config::StripeConfig;
use crate::error::BillingError;

const PROVIDER: &str = "stripe";

/// Minimal Stripe client, authenticated with a secret key.
pub struct StripeClient {
    api_url: String,
    secret_key: SecretString,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(api_url: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            api_url: api_url.into(),
            secret_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &StripeConfig) -> Self {
        Self::new(&config.api_url, config.secret_key.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_url.trim_end_matches('/'))
    }
}

fn request_failed(reason: impl ToString) -> BillingError {
    BillingError::RequestFailed {
        provider: PROVIDER.into(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
        name: &str,
    ) -> Result<Customer, BillingError> {
        let form = [
            ("email", email),
            ("name", name),
            ("metadata[user_id]", user_id),
        ];
        let resp = self
            .client
            .post(self.endpoint("customers"))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(request_failed)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(request_failed(format!("{status}: {body}")));
        }

        let customer: Customer = resp
            .json()
            .await
            .map_err(|e| BillingError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;
        debug!(customer_id = %customer.id, user_id, "Stripe customer created");
        Ok(customer)
    }
}
