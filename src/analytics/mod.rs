//! Analytics warehouse seam.
//!
//! When a request has analytics enabled, device and stat writes go to an
//! [`AnalyticsSink`] instead of the primary store.

pub mod clickhouse;

use async_trait::async_trait;

use crate::error::AnalyticsError;
use crate::store::models::{Device, Stat};

pub use clickhouse::ClickHouseClient;

/// Write side of the analytics warehouse.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Insert or replace device rows.
    async fn send_devices(&self, devices: &[Device]) -> Result<(), AnalyticsError>;

    /// Append update-event rows.
    async fn send_logs(&self, stats: &[Stat]) -> Result<(), AnalyticsError>;
}
