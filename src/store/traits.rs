//! Unified async `Database` trait for all persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::segments::FactSource;
use crate::store::models::{
    ApiKey, App, AppRight, AppUsage, AppVersion, AppVersionUpsert, Channel, DataBackend, Device,
    DeviceQuery, Org, PlanRecord, Stat, StatsQuery, StoreApp, StripeInfo, UsageQuery, User,
};

/// Identity of a channel upsert once required fields are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKey<'a> {
    pub app_id: &'a str,
    pub name: &'a str,
    pub created_by: &'a str,
}

/// Backend-agnostic database trait.
///
/// The classifier lookups come from the [`FactSource`] supertrait.
#[async_trait]
pub trait Database: FactSource + Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users & billing ─────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError>;

    /// Link a user to a payment-provider customer.
    async fn set_user_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), DatabaseError>;

    async fn insert_stripe_info(&self, info: &StripeInfo) -> Result<(), DatabaseError>;

    async fn get_stripe_info(&self, customer_id: &str) -> Result<Option<StripeInfo>, DatabaseError>;

    async fn insert_plan(&self, plan: &PlanRecord) -> Result<(), DatabaseError>;

    /// Plan whose payment-provider product id is `stripe_id`.
    async fn get_plan_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<PlanRecord>, DatabaseError>;

    /// Name of the plan the user is billed on, `None` without billing record.
    async fn current_plan_name(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;

    /// Usage of the current plan, in percent.
    async fn plan_usage_percent(&self, user_id: &str) -> Result<f64, DatabaseError>;

    // ── Rights ──────────────────────────────────────────────────────

    async fn is_admin(&self, user_id: &str) -> Result<bool, DatabaseError>;

    async fn add_admin(&self, user_id: &str) -> Result<(), DatabaseError>;

    /// Owners hold every right; members hold their granted right and the weaker ones.
    async fn has_app_right(
        &self,
        user_id: &str,
        app_id: &str,
        right: AppRight,
    ) -> Result<bool, DatabaseError>;

    async fn add_app_member(
        &self,
        app_id: &str,
        user_id: &str,
        right: AppRight,
    ) -> Result<(), DatabaseError>;

    // ── Apps, versions, channels ────────────────────────────────────

    async fn insert_app(&self, app: &App) -> Result<(), DatabaseError>;

    /// Whether `user_id` owns `app_id`.
    async fn is_app_owner(&self, user_id: &str, app_id: &str) -> Result<bool, DatabaseError>;

    /// Ids of every app owned by the user.
    async fn list_app_ids(&self, user_id: &str) -> Result<Vec<String>, DatabaseError>;

    async fn upsert_app_version(
        &self,
        version: &AppVersionUpsert,
    ) -> Result<AppVersion, DatabaseError>;

    async fn upsert_channel(
        &self,
        key: ChannelKey<'_>,
        version: Option<i64>,
        public: bool,
    ) -> Result<Channel, DatabaseError>;

    // ── Devices, stats, usage ───────────────────────────────────────

    /// Insert or replace a device, keyed by `device_id`.
    async fn upsert_device(&self, backend: DataBackend, device: &Device)
    -> Result<(), DatabaseError>;

    async fn get_device(
        &self,
        backend: DataBackend,
        app_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>, DatabaseError>;

    async fn list_devices(
        &self,
        backend: DataBackend,
        query: &DeviceQuery,
    ) -> Result<Vec<Device>, DatabaseError>;

    /// Number of devices of the app, ignoring every other filter.
    async fn count_devices(&self, backend: DataBackend, app_id: &str)
    -> Result<u64, DatabaseError>;

    /// Set the custom id of a device in the primary store. Returns rows updated.
    async fn update_device_custom_id(
        &self,
        app_id: &str,
        device_id: &str,
        custom_id: &str,
    ) -> Result<u64, DatabaseError>;

    async fn insert_stat(&self, backend: DataBackend, stat: &Stat) -> Result<(), DatabaseError>;

    async fn list_stats(
        &self,
        backend: DataBackend,
        query: &StatsQuery,
    ) -> Result<Vec<Stat>, DatabaseError>;

    /// Number of stats of the app, ignoring every other filter.
    async fn count_stats(&self, backend: DataBackend, app_id: &str) -> Result<u64, DatabaseError>;

    async fn insert_app_usage(
        &self,
        backend: DataBackend,
        usage: &AppUsage,
    ) -> Result<(), DatabaseError>;

    async fn list_app_usage(
        &self,
        backend: DataBackend,
        query: &UsageQuery,
    ) -> Result<Vec<AppUsage>, DatabaseError>;

    // ── Provisioning ────────────────────────────────────────────────

    async fn count_api_keys(&self, user_id: &str) -> Result<u64, DatabaseError>;

    /// Insert all keys atomically.
    async fn insert_api_keys(&self, keys: &[ApiKey]) -> Result<(), DatabaseError>;

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DatabaseError>;

    async fn count_orgs_created_by(&self, user_id: &str) -> Result<u64, DatabaseError>;

    async fn insert_org(&self, org: &Org) -> Result<Org, DatabaseError>;

    async fn list_orgs_created_by(&self, user_id: &str) -> Result<Vec<Org>, DatabaseError>;

    // ── Store listings ──────────────────────────────────────────────

    async fn upsert_store_apps(&self, apps: &[StoreApp]) -> Result<(), DatabaseError>;

    async fn get_store_app(&self, app_id: &str) -> Result<Option<StoreApp>, DatabaseError>;

    /// Mark the app as on-prem and add `updates` to its update counter.
    async fn increment_store(&self, app_id: &str, updates: i64) -> Result<(), DatabaseError>;
}
