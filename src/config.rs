//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default length of the free trial granted to new billing customers.
pub const DEFAULT_TRIAL_DAYS: i64 = 15;

const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
const DEFAULT_PLUNK_API_URL: &str = "https://api.useplunk.com";

/// Backend configuration, assembled from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the local libSQL database file.
    pub database_path: PathBuf,
    /// Trial length for newly created customers, in days.
    pub trial_days: i64,
    /// Analytics warehouse connection. `None` routes everything to the primary store.
    pub analytics: Option<AnalyticsConfig>,
    /// Payment provider credentials.
    pub stripe: Option<StripeConfig>,
    /// Contact service credentials.
    pub plunk: Option<PlunkConfig>,
}

/// ClickHouse HTTP endpoint.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub url: String,
    pub user: String,
    pub password: SecretString,
}

/// Stripe API credentials.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: SecretString,
}

/// Plunk API credentials.
#[derive(Debug, Clone)]
pub struct PlunkConfig {
    pub api_url: String,
    pub api_key: SecretString,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// Optional integrations are enabled only when their key variable is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = std::env::var("CAPGO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/capgo.db"));

        let trial_days = match std::env::var("CAPGO_TRIAL_DAYS") {
            Ok(raw) => parse_trial_days(&raw)?,
            Err(_) => DEFAULT_TRIAL_DAYS,
        };

        Ok(Self {
            database_path,
            trial_days,
            analytics: AnalyticsConfig::from_env(),
            stripe: StripeConfig::from_env(),
            plunk: PlunkConfig::from_env(),
        })
    }

    /// Whether listing and ingest operations should target the analytics backend.
    pub fn analytics_enabled(&self) -> bool {
        self.analytics.is_some()
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("CLICKHOUSE_URL").ok()?;
        if url.trim().is_empty() {
            return None;
        }
        Some(Self {
            url,
            user: std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
            password: SecretString::from(std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default()),
        })
    }
}

impl StripeConfig {
    pub fn from_env() -> Option<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY").ok()?;
        Some(Self {
            api_url: std::env::var("STRIPE_API_URL")
                .unwrap_or_else(|_| DEFAULT_STRIPE_API_URL.to_string()),
            secret_key: SecretString::from(secret_key),
        })
    }
}

impl PlunkConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PLUNK_API_KEY").ok()?;
        Some(Self {
            api_url: std::env::var("PLUNK_API_URL")
                .unwrap_or_else(|_| DEFAULT_PLUNK_API_URL.to_string()),
            api_key: SecretString::from(api_key),
        })
    }
}

fn parse_trial_days(raw: &str) -> Result<i64, ConfigError> {
    let days: i64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: "CAPGO_TRIAL_DAYS".to_string(),
        message: format!("{e}"),
    })?;
    if days < 0 {
        return Err(ConfigError::InvalidValue {
            key: "CAPGO_TRIAL_DAYS".to_string(),
            message: "must not be negative".to_string(),
        });
    }
    Ok(days)
}
