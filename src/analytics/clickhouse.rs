//! ClickHouse HTTP client. Inserts rows with `FORMAT JSONEachRow`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::analytics::AnalyticsSink;
use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::store::models::{Device, Stat};

const DEVICES_TABLE: &str = "devices";
const LOGS_TABLE: &str = "logs";

/// Client for the ClickHouse HTTP interface.
pub struct ClickHouseClient {
    url: String,
    user: String,
    password: SecretString,
    client: reqwest::Client,
}

impl ClickHouseClient {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: SecretString) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(&config.url, &config.user, config.password.clone())
    }

    /// POST `rows` into `table`. An empty batch is not sent.
    async fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), AnalyticsError> {
        if rows.is_empty() {
            return Ok(());
        }
        let body = json_each_row(rows)?;
        debug!(table, rows = rows.len(), "ClickHouse insert");

        let resp = self
            .client
            .post(&self.url)
            .query(&[("query", format!("INSERT INTO {table} FORMAT JSONEachRow"))])
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| AnalyticsError::InsertFailed {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AnalyticsError::InsertFailed {
                table: table.to_string(),
                reason: format!("{status}: {text}"),
            });
        }
        Ok(())
    }
}

/// One JSON object per line.
fn json_each_row<T: Serialize>(rows: &[T]) -> Result<String, AnalyticsError> {
    let mut body = String::new();
    for row in rows {
        body.push_str(&serde_json::to_string(row)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl AnalyticsSink for ClickHouseClient {
    async fn send_devices(&self, devices: &[Device]) -> Result<(), AnalyticsError> {
        self.insert(DEVICES_TABLE, devices).await
    }

    async fn send_logs(&self, stats: &[Stat]) -> Result<(), AnalyticsError> {
        self.insert(LOGS_TABLE, stats).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::models::Platform;

    #[test]
    fn rows_are_newline_delimited() {
        let stat = Stat {
            app_id: "com.demo".into(),
            device_id: "d1".into(),
            action: "get".into(),
            platform: Platform::Ios,
            version: 3,
            version_build: "1.2.0".into(),
            created_at: Utc::now(),
        };
        let body = json_each_row(&[stat.clone(), stat]).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["platform"], "ios");
        assert_eq!(parsed["action"], "get");
    }
}
