//! Error types for the Capgo backend.

/// Top-level error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Contact error: {0}")]
    Contact(#[from] ContactError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Device {device_id} not found for app {app_id}")]
    DeviceNotFound { app_id: String, device_id: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Authorization failures for app-scoped operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("User {user_id} is not allowed to {right} app {app_id}")]
    NotAllowed {
        user_id: String,
        app_id: String,
        right: String,
    },
}

/// Payment provider errors.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Payment provider is not configured")]
    NotConfigured,

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Contact/marketing service errors.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Contact service request failed: {0}")]
    RequestFailed(String),

    #[error("Contact service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Analytics warehouse errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Analytics insert into {table} failed: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, Error>;
