//! Row types persisted by the store, plus the listing parameters the
//! backends understand.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Users & billing ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub country: Option<String>,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            image_url: None,
            country: None,
            customer_id: None,
            created_at: Utc::now(),
        }
    }

    /// "First Last", with missing parts rendered as empty strings.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
    }
}

/// Subscription status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeStatus {
    Created,
    Succeeded,
    Updated,
    Failed,
    Deleted,
    Canceled,
}

impl StripeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Succeeded => "succeeded",
            Self::Updated => "updated",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
            Self::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for StripeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "succeeded" => Ok(Self::Succeeded),
            "updated" => Ok(Self::Updated),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown stripe status: {other}")),
        }
    }
}

/// Billing record of a customer (`stripe_info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeInfo {
    pub customer_id: String,
    pub status: Option<StripeStatus>,
    pub product_id: String,
    pub price_id: Option<String>,
    pub subscription_id: Option<String>,
    pub trial_at: DateTime<Utc>,
    /// Usage is within the limits of the current plan.
    pub is_good_plan: bool,
    /// Plan usage, in percent of the plan limits.
    pub plan_usage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StripeInfo {
    /// A fresh record on the free product with a trial ending at `trial_at`.
    pub fn new_trial(customer_id: impl Into<String>, trial_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            customer_id: customer_id.into(),
            status: None,
            product_id: FREE_PRODUCT_ID.to_string(),
            price_id: None,
            subscription_id: None,
            trial_at,
            is_good_plan: true,
            plan_usage: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Product id assigned to customers before they subscribe.
pub const FREE_PRODUCT_ID: &str = "free";

/// A billing tier (`plans`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: String,
    pub name: String,
    /// Payment-provider product id.
    pub stripe_id: String,
    pub price_m_id: String,
    pub price_y_id: String,
    pub price_m: i64,
    pub price_y: i64,
    pub mau: i64,
    pub storage: i64,
    pub bandwidth: i64,
}

// ── Apps, versions, channels ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub app_id: String,
    pub user_id: String,
    pub name: String,
    pub icon_url: String,
    pub created_at: DateTime<Utc>,
}

impl App {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        Self {
            name: app_id.clone(),
            app_id,
            user_id: user_id.into(),
            icon_url: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Right a user holds on an app. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppRight {
    Read,
    Upload,
    Write,
    Admin,
}

impl AppRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Upload => "upload",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    pub fn rank(&self) -> i64 {
        match self {
            Self::Read => 1,
            Self::Upload => 2,
            Self::Write => 3,
            Self::Admin => 4,
        }
    }
}

impl std::fmt::Display for AppRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insert-or-update payload for `app_versions`, keyed by `(app_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppVersionUpsert {
    pub app_id: String,
    pub name: String,
    pub user_id: String,
    pub bucket_id: Option<String>,
    pub external_url: Option<String>,
    pub checksum: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppVersion {
    pub id: i64,
    pub app_id: String,
    pub name: String,
    pub user_id: String,
    pub bucket_id: Option<String>,
    pub external_url: Option<String>,
    pub checksum: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Channel upsert as received from callers. Identity fields may be missing
/// and are validated before anything reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpsert {
    pub app_id: Option<String>,
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub version: Option<i64>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub app_id: String,
    pub name: String,
    pub created_by: String,
    pub version: Option<i64>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Devices, stats, usage ───────────────────────────────────────────

/// Which physical table family a device/stat/usage operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackend {
    /// Tables in the primary store.
    Primary,
    /// Mirror tables fed by the analytics warehouse.
    Analytics,
}

impl DataBackend {
    pub fn from_flag(analytics_enabled: bool) -> Self {
        if analytics_enabled {
            Self::Analytics
        } else {
            Self::Primary
        }
    }

    pub fn devices_table(&self) -> &'static str {
        match self {
            Self::Primary => "devices",
            Self::Analytics => "clickhouse_devices",
        }
    }

    pub fn stats_table(&self) -> &'static str {
        match self {
            Self::Primary => "stats",
            Self::Analytics => "clickhouse_logs",
        }
    }

    pub fn usage_table(&self) -> &'static str {
        match self {
            Self::Primary => "app_usage",
            Self::Analytics => "clickhouse_app_usage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub app_id: String,
    pub platform: Platform,
    pub os_version: String,
    pub version: i64,
    pub version_build: String,
    pub plugin_version: String,
    pub is_emulator: bool,
    pub is_prod: bool,
    pub custom_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial device as reported by the updater plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub device_id: Option<String>,
    pub app_id: Option<String>,
    pub platform: Option<Platform>,
    pub os_version: Option<String>,
    pub version: Option<i64>,
    pub version_build: Option<String>,
    pub plugin_version: Option<String>,
    pub is_emulator: Option<bool>,
    pub is_prod: Option<bool>,
    pub custom_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One update-lifecycle event reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub app_id: String,
    pub device_id: String,
    pub action: String,
    pub platform: Platform,
    pub version: i64,
    pub version_build: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatUpdate {
    pub app_id: Option<String>,
    pub device_id: Option<String>,
    pub action: Option<String>,
    pub platform: Option<Platform>,
    pub version: Option<i64>,
    pub version_build: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Daily usage of one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsage {
    pub app_id: String,
    pub date: NaiveDate,
    pub mau: i64,
    pub bandwidth: i64,
    pub storage_added: i64,
    pub storage_deleted: i64,
}

// ── Listing parameters ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort marker of a table column. Only a non-empty string sorts: `"asc"`
/// ascending, anything else descending. `true`/`false` only flag the column
/// as sortable in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sortable {
    Direction(SortDirection),
    Flag(bool),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub key: String,
    #[serde(default)]
    pub sortable: Option<Sortable>,
}

impl OrderBy {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: key.into(),
            sortable: Some(Sortable::Direction(direction)),
        }
    }

    pub fn direction(&self) -> Option<SortDirection> {
        match &self.sortable {
            Some(Sortable::Direction(d)) => Some(*d),
            Some(Sortable::Other(s)) if !s.is_empty() => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Inclusive row window, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceQuery {
    pub app_id: String,
    pub version_id: Option<i64>,
    #[serde(default)]
    pub device_ids: Vec<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    pub range: Option<RowRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsQuery {
    pub app_id: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    pub range: Option<RowRange>,
    /// Only events strictly after this timestamp.
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageQuery {
    pub app_ids: Vec<String>,
    /// Exclusive lower bound.
    pub start_date: Option<NaiveDate>,
    /// Exclusive upper bound.
    pub end_date: Option<NaiveDate>,
}

// ── Provisioning & store info ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    All,
    Upload,
    Read,
    Write,
}

impl KeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Upload => "upload",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl std::str::FromStr for KeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "upload" => Ok(Self::Upload),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(format!("unknown key mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub user_id: String,
    pub key: String,
    pub mode: KeyMode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Org {
    pub id: String,
    pub created_by: String,
    pub logo: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Public store listing of an app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreApp {
    pub app_id: String,
    pub title: String,
    pub url: String,
    pub icon: String,
    pub developer: String,
    pub installs: i64,
    #[serde(default)]
    pub onprem: bool,
    #[serde(default)]
    pub updates: i64,
}
