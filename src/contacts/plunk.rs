//! Plunk event-tracking client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::config::PlunkConfig;
use crate::contacts::{ContactData, ContactSink};
use crate::error::ContactError;

const ADD_DATA_EVENT: &str = "user:addData";

#[derive(Serialize)]
struct TrackEvent<'a> {
    event: &'a str,
    email: &'a str,
    data: &'a ContactData,
}

/// Plunk client; contact data is attached through tracked events.
pub struct PlunkClient {
    api_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl PlunkClient {
    pub fn new(api_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            api_url: api_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &PlunkConfig) -> Self {
        Self::new(&config.api_url, config.api_key.clone())
    }

    async fn track(&self, event: &TrackEvent<'_>) -> Result<(), ContactError> {
        let url = format!("{}/v1/track", self.api_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(event)
            .send()
            .await
            .map_err(|e| ContactError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ContactError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        debug!(event = event.event, email = event.email, "Plunk event tracked");
        Ok(())
    }
}

#[async_trait]
impl ContactSink for PlunkClient {
    async fn add_data_contact(&self, email: &str, data: &ContactData) -> Result<(), ContactError> {
        self.track(&TrackEvent {
            event: ADD_DATA_EVENT,
            email,
            data,
        })
        .await
    }
}
