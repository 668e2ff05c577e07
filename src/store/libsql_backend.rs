//! libSQL implementation of the async `Database` trait.
//!
//! Supports local file and in-memory databases. Device, stats and usage
//! tables exist twice (primary and analytics mirror); every operation on
//! them takes the [`DataBackend`] to target.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params, params_from_iter};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::segments::FactSource;
use crate::store::filter::ListFilter;
use crate::store::migrations;
use crate::store::models::{
    ApiKey, App, AppRight, AppUsage, AppVersion, AppVersionUpsert, Channel, DataBackend, Device,
    DeviceQuery, Org, OrderBy, PlanRecord, SortDirection, Stat, StatsQuery, StoreApp, StripeInfo,
    StripeStatus, UsageQuery, User,
};
use crate::store::traits::{ChannelKey, Database};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// First column of the first row as an integer, `None` without rows.
    async fn scalar_i64(
        &self,
        op: &str,
        sql: &str,
        args: Vec<Value>,
    ) -> Result<Option<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params_from_iter(args))
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn exists(&self, op: &str, sql: &str, args: Vec<Value>) -> Result<bool, DatabaseError> {
        Ok(self.scalar_i64(op, sql, args).await?.unwrap_or(0) != 0)
    }

    /// Run a query and map every row.
    async fn collect<T>(
        &self,
        op: &str,
        sql: &str,
        args: Vec<Value>,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params_from_iter(args))
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    /// Billing record of the user, joined through `users.customer_id`.
    async fn stripe_info_for_user(&self, user_id: &str) -> Result<Option<StripeInfo>, DatabaseError> {
        let sql = format!(
            "SELECT {STRIPE_COLUMNS_PREFIXED} FROM users u JOIN stripe_info s ON s.customer_id = u.customer_id WHERE u.id = ?1"
        );
        let mut found = self
            .collect("stripe_info_for_user", &sql, vec![text(user_id)], row_to_stripe_info)
            .await?;
        Ok(found.pop())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn flag(b: bool) -> i64 {
    if b { 1 } else { 0 }
}

fn row_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{op} row parse: {e}"))
}

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, image_url, country, customer_id, created_at";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let e = row_err("user");
    let created: String = row.get(7).map_err(&e)?;
    Ok(User {
        id: row.get(0).map_err(&e)?,
        email: row.get(1).map_err(&e)?,
        first_name: row.get(2).ok(),
        last_name: row.get(3).ok(),
        image_url: row.get(4).ok(),
        country: row.get(5).ok(),
        customer_id: row.get(6).ok(),
        created_at: parse_datetime(&created),
    })
}

const STRIPE_COLUMNS: &str = "customer_id, status, product_id, price_id, subscription_id, trial_at, is_good_plan, plan_usage, created_at, updated_at";

const STRIPE_COLUMNS_PREFIXED: &str = "s.customer_id, s.status, s.product_id, s.price_id, s.subscription_id, s.trial_at, s.is_good_plan, s.plan_usage, s.created_at, s.updated_at";

fn row_to_stripe_info(row: &libsql::Row) -> Result<StripeInfo, DatabaseError> {
    let e = row_err("stripe_info");
    let status: Option<String> = row.get(1).ok();
    let trial_at: String = row.get(5).map_err(&e)?;
    let created: String = row.get(8).map_err(&e)?;
    let updated: String = row.get(9).map_err(&e)?;
    Ok(StripeInfo {
        customer_id: row.get(0).map_err(&e)?,
        status: status.and_then(|s| s.parse::<StripeStatus>().ok()),
        product_id: row.get(2).map_err(&e)?,
        price_id: row.get(3).ok(),
        subscription_id: row.get(4).ok(),
        trial_at: parse_datetime(&trial_at),
        is_good_plan: row.get::<i64>(6).unwrap_or(0) != 0,
        plan_usage: row.get::<f64>(7).unwrap_or(0.0),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const PLAN_COLUMNS: &str =
    "id, name, stripe_id, price_m_id, price_y_id, price_m, price_y, mau, storage, bandwidth";

fn row_to_plan(row: &libsql::Row) -> Result<PlanRecord, DatabaseError> {
    let e = row_err("plan");
    Ok(PlanRecord {
        id: row.get(0).map_err(&e)?,
        name: row.get(1).map_err(&e)?,
        stripe_id: row.get(2).map_err(&e)?,
        price_m_id: row.get(3).map_err(&e)?,
        price_y_id: row.get(4).map_err(&e)?,
        price_m: row.get::<i64>(5).unwrap_or(0),
        price_y: row.get::<i64>(6).unwrap_or(0),
        mau: row.get::<i64>(7).unwrap_or(0),
        storage: row.get::<i64>(8).unwrap_or(0),
        bandwidth: row.get::<i64>(9).unwrap_or(0),
    })
}

const VERSION_COLUMNS: &str = "id, app_id, name, user_id, bucket_id, external_url, checksum, deleted, created_at, updated_at";

fn row_to_version(row: &libsql::Row) -> Result<AppVersion, DatabaseError> {
    let e = row_err("app_version");
    let created: String = row.get(8).map_err(&e)?;
    let updated: String = row.get(9).map_err(&e)?;
    Ok(AppVersion {
        id: row.get(0).map_err(&e)?,
        app_id: row.get(1).map_err(&e)?,
        name: row.get(2).map_err(&e)?,
        user_id: row.get(3).map_err(&e)?,
        bucket_id: row.get(4).ok(),
        external_url: row.get(5).ok(),
        checksum: row.get(6).ok(),
        deleted: row.get::<i64>(7).unwrap_or(0) != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const CHANNEL_COLUMNS: &str = "id, app_id, name, created_by, version, public, created_at, updated_at";

fn row_to_channel(row: &libsql::Row) -> Result<Channel, DatabaseError> {
    let e = row_err("channel");
    let created: String = row.get(6).map_err(&e)?;
    let updated: String = row.get(7).map_err(&e)?;
    Ok(Channel {
        id: row.get(0).map_err(&e)?,
        app_id: row.get(1).map_err(&e)?,
        name: row.get(2).map_err(&e)?,
        created_by: row.get(3).map_err(&e)?,
        version: row.get::<i64>(4).ok(),
        public: row.get::<i64>(5).unwrap_or(0) != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const DEVICE_COLUMNS: &str = "device_id, app_id, platform, os_version, version, version_build, plugin_version, is_emulator, is_prod, custom_id, created_at, updated_at";

/// Columns a device listing may be sorted by.
const DEVICE_SORTABLE: &[&str] = &[
    "device_id",
    "custom_id",
    "platform",
    "os_version",
    "version",
    "version_build",
    "plugin_version",
    "is_emulator",
    "is_prod",
    "created_at",
    "updated_at",
];

fn row_to_device(row: &libsql::Row) -> Result<Device, DatabaseError> {
    let e = row_err("device");
    let platform: String = row.get(2).map_err(&e)?;
    let created: String = row.get(10).map_err(&e)?;
    let updated: String = row.get(11).map_err(&e)?;
    Ok(Device {
        device_id: row.get(0).map_err(&e)?,
        app_id: row.get(1).map_err(&e)?,
        platform: platform.parse().map_err(DatabaseError::Query)?,
        os_version: row.get(3).map_err(&e)?,
        version: row.get(4).map_err(&e)?,
        version_build: row.get(5).map_err(&e)?,
        plugin_version: row.get(6).map_err(&e)?,
        is_emulator: row.get::<i64>(7).unwrap_or(0) != 0,
        is_prod: row.get::<i64>(8).unwrap_or(0) != 0,
        custom_id: row.get(9).unwrap_or_default(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const STAT_COLUMNS: &str = "app_id, device_id, action, platform, version, version_build, created_at";

const STAT_SORTABLE: &[&str] = &[
    "device_id",
    "action",
    "platform",
    "version",
    "version_build",
    "created_at",
];

fn row_to_stat(row: &libsql::Row) -> Result<Stat, DatabaseError> {
    let e = row_err("stat");
    let platform: String = row.get(3).map_err(&e)?;
    let created: String = row.get(6).map_err(&e)?;
    Ok(Stat {
        app_id: row.get(0).map_err(&e)?,
        device_id: row.get(1).map_err(&e)?,
        action: row.get(2).map_err(&e)?,
        platform: platform.parse().map_err(DatabaseError::Query)?,
        version: row.get(4).map_err(&e)?,
        version_build: row.get(5).map_err(&e)?,
        created_at: parse_datetime(&created),
    })
}

const USAGE_COLUMNS: &str = "app_id, date, mau, bandwidth, storage_added, storage_deleted";

fn row_to_usage(row: &libsql::Row) -> Result<AppUsage, DatabaseError> {
    let e = row_err("app_usage");
    let date: String = row.get(1).map_err(&e)?;
    Ok(AppUsage {
        app_id: row.get(0).map_err(&e)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|err| DatabaseError::Query(format!("app_usage date {date}: {err}")))?,
        mau: row.get::<i64>(2).unwrap_or(0),
        bandwidth: row.get::<i64>(3).unwrap_or(0),
        storage_added: row.get::<i64>(4).unwrap_or(0),
        storage_deleted: row.get::<i64>(5).unwrap_or(0),
    })
}

fn row_to_api_key(row: &libsql::Row) -> Result<ApiKey, DatabaseError> {
    let e = row_err("apikey");
    let mode: String = row.get(2).map_err(&e)?;
    let created: String = row.get(3).map_err(&e)?;
    Ok(ApiKey {
        user_id: row.get(0).map_err(&e)?,
        key: row.get(1).map_err(&e)?,
        mode: mode.parse().map_err(DatabaseError::Query)?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_org(row: &libsql::Row) -> Result<Org, DatabaseError> {
    let e = row_err("org");
    let created: String = row.get(4).map_err(&e)?;
    Ok(Org {
        id: row.get(0).map_err(&e)?,
        created_by: row.get(1).map_err(&e)?,
        logo: row.get(2).unwrap_or_default(),
        name: row.get(3).map_err(&e)?,
        created_at: parse_datetime(&created),
    })
}

const STORE_APP_COLUMNS: &str = "app_id, title, url, icon, developer, installs, onprem, updates";

fn row_to_store_app(row: &libsql::Row) -> Result<StoreApp, DatabaseError> {
    let e = row_err("store_app");
    Ok(StoreApp {
        app_id: row.get(0).map_err(&e)?,
        title: row.get(1).unwrap_or_default(),
        url: row.get(2).unwrap_or_default(),
        icon: row.get(3).unwrap_or_default(),
        developer: row.get(4).unwrap_or_default(),
        installs: row.get::<i64>(5).unwrap_or(0),
        onprem: row.get::<i64>(6).unwrap_or(0) != 0,
        updates: row.get::<i64>(7).unwrap_or(0),
    })
}

// ── Fact lookups ────────────────────────────────────────────────────

#[async_trait]
impl FactSource for LibSqlBackend {
    async fn is_onboarded(&self, user_id: &str) -> Result<bool, DatabaseError> {
        self.exists(
            "is_onboarded",
            "SELECT EXISTS(SELECT 1 FROM apps WHERE user_id = ?1) AND EXISTS(SELECT 1 FROM app_versions WHERE user_id = ?1)",
            vec![text(user_id)],
        )
        .await
    }

    async fn is_canceled(&self, user_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .stripe_info_for_user(user_id)
            .await?
            .is_some_and(|s| s.status == Some(StripeStatus::Canceled)))
    }

    async fn trial_days_left(&self, user_id: &str) -> Result<u32, DatabaseError> {
        let Some(info) = self.stripe_info_for_user(user_id).await? else {
            return Ok(0);
        };
        let days = (info.trial_at.date_naive() - Utc::now().date_naive()).num_days();
        Ok(days.clamp(0, u32::MAX as i64) as u32)
    }

    async fn is_paying(&self, user_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .stripe_info_for_user(user_id)
            .await?
            .is_some_and(|s| s.status == Some(StripeStatus::Succeeded)))
    }

    async fn is_good_plan(&self, user_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .stripe_info_for_user(user_id)
            .await?
            .is_some_and(|s| s.is_good_plan))
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users & billing ─────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    user.id.as_str(),
                    user.email.as_str(),
                    opt_text(user.first_name.as_deref()),
                    opt_text(user.last_name.as_deref()),
                    opt_text(user.image_url.as_deref()),
                    opt_text(user.country.as_deref()),
                    opt_text(user.customer_id.as_deref()),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;
        debug!(user_id = %user.id, "User inserted");
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let mut found = self
            .collect(
                "get_user",
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                vec![text(user_id)],
                row_to_user,
            )
            .await?;
        Ok(found.pop())
    }

    async fn set_user_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET customer_id = ?1 WHERE id = ?2",
                params![customer_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_user_customer_id: {e}")))?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_stripe_info(&self, info: &StripeInfo) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO stripe_info ({STRIPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    info.customer_id.as_str(),
                    opt_text(info.status.as_ref().map(|s| s.as_str())),
                    info.product_id.as_str(),
                    opt_text(info.price_id.as_deref()),
                    opt_text(info.subscription_id.as_deref()),
                    info.trial_at.to_rfc3339(),
                    flag(info.is_good_plan),
                    info.plan_usage,
                    info.created_at.to_rfc3339(),
                    info.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("stripe_info {}: {msg}", info.customer_id))
                } else {
                    DatabaseError::Query(format!("insert_stripe_info: {msg}"))
                }
            })?;
        Ok(())
    }

    async fn get_stripe_info(&self, customer_id: &str) -> Result<Option<StripeInfo>, DatabaseError> {
        let mut found = self
            .collect(
                "get_stripe_info",
                &format!("SELECT {STRIPE_COLUMNS} FROM stripe_info WHERE customer_id = ?1"),
                vec![text(customer_id)],
                row_to_stripe_info,
            )
            .await?;
        Ok(found.pop())
    }

    async fn insert_plan(&self, plan: &PlanRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO plans ({PLAN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    plan.id.as_str(),
                    plan.name.as_str(),
                    plan.stripe_id.as_str(),
                    plan.price_m_id.as_str(),
                    plan.price_y_id.as_str(),
                    plan.price_m,
                    plan.price_y,
                    plan.mau,
                    plan.storage,
                    plan.bandwidth,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_plan: {e}")))?;
        Ok(())
    }

    async fn get_plan_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<PlanRecord>, DatabaseError> {
        let mut found = self
            .collect(
                "get_plan_by_stripe_id",
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE stripe_id = ?1"),
                vec![text(stripe_id)],
                row_to_plan,
            )
            .await?;
        Ok(found.pop())
    }

    async fn current_plan_name(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let Some(info) = self.stripe_info_for_user(user_id).await? else {
            return Ok(None);
        };
        Ok(self
            .get_plan_by_stripe_id(&info.product_id)
            .await?
            .map(|p| p.name))
    }

    async fn plan_usage_percent(&self, user_id: &str) -> Result<f64, DatabaseError> {
        Ok(self
            .stripe_info_for_user(user_id)
            .await?
            .map(|s| s.plan_usage)
            .unwrap_or(0.0))
    }

    // ── Rights ──────────────────────────────────────────────────────

    async fn is_admin(&self, user_id: &str) -> Result<bool, DatabaseError> {
        self.exists(
            "is_admin",
            "SELECT EXISTS(SELECT 1 FROM admin_users WHERE user_id = ?1)",
            vec![text(user_id)],
        )
        .await
    }

    async fn add_admin(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO admin_users (user_id) VALUES (?1)",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_admin: {e}")))?;
        Ok(())
    }

    async fn has_app_right(
        &self,
        user_id: &str,
        app_id: &str,
        right: AppRight,
    ) -> Result<bool, DatabaseError> {
        self.exists(
            "has_app_right",
            "SELECT EXISTS(SELECT 1 FROM apps WHERE app_id = ?1 AND user_id = ?2)
                OR EXISTS(SELECT 1 FROM app_members WHERE app_id = ?1 AND user_id = ?2 AND right_rank >= ?3)",
            vec![text(app_id), text(user_id), Value::Integer(right.rank())],
        )
        .await
    }

    async fn add_app_member(
        &self,
        app_id: &str,
        user_id: &str,
        right: AppRight,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO app_members (app_id, user_id, right_rank) VALUES (?1, ?2, ?3)
                 ON CONFLICT(app_id, user_id) DO UPDATE SET right_rank = excluded.right_rank",
                params![app_id, user_id, right.rank()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_app_member: {e}")))?;
        Ok(())
    }

    // ── Apps, versions, channels ────────────────────────────────────

    async fn insert_app(&self, app: &App) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO apps (app_id, user_id, name, icon_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    app.app_id.as_str(),
                    app.user_id.as_str(),
                    app.name.as_str(),
                    app.icon_url.as_str(),
                    app.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_app: {e}")))?;
        Ok(())
    }

    async fn is_app_owner(&self, user_id: &str, app_id: &str) -> Result<bool, DatabaseError> {
        self.exists(
            "is_app_owner",
            "SELECT EXISTS(SELECT 1 FROM apps WHERE user_id = ?1 AND app_id = ?2)",
            vec![text(user_id), text(app_id)],
        )
        .await
    }

    async fn list_app_ids(&self, user_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.collect(
            "list_app_ids",
            "SELECT app_id FROM apps WHERE user_id = ?1 ORDER BY app_id",
            vec![text(user_id)],
            |row| row.get::<String>(0).map_err(row_err("app_id")),
        )
        .await
    }

    async fn upsert_app_version(
        &self,
        version: &AppVersionUpsert,
    ) -> Result<AppVersion, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO app_versions (app_id, name, user_id, bucket_id, external_url, checksum, deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(app_id, name) DO UPDATE SET
                    user_id = excluded.user_id,
                    bucket_id = excluded.bucket_id,
                    external_url = excluded.external_url,
                    checksum = excluded.checksum,
                    deleted = excluded.deleted,
                    updated_at = excluded.updated_at",
                params![
                    version.app_id.as_str(),
                    version.name.as_str(),
                    version.user_id.as_str(),
                    opt_text(version.bucket_id.as_deref()),
                    opt_text(version.external_url.as_deref()),
                    opt_text(version.checksum.as_deref()),
                    flag(version.deleted),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_app_version: {e}")))?;

        let mut found = self
            .collect(
                "upsert_app_version",
                &format!("SELECT {VERSION_COLUMNS} FROM app_versions WHERE app_id = ?1 AND name = ?2"),
                vec![text(&version.app_id), text(&version.name)],
                row_to_version,
            )
            .await?;
        found.pop().ok_or_else(|| DatabaseError::NotFound {
            entity: "app_version".into(),
            id: format!("{}@{}", version.app_id, version.name),
        })
    }

    async fn upsert_channel(
        &self,
        key: ChannelKey<'_>,
        version: Option<i64>,
        public: bool,
    ) -> Result<Channel, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let version_value = match version {
            Some(v) => Value::Integer(v),
            None => Value::Null,
        };
        self.conn()
            .execute(
                "INSERT INTO channels (app_id, name, created_by, version, public, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(app_id, name, created_by) DO UPDATE SET
                    version = excluded.version,
                    public = excluded.public,
                    updated_at = excluded.updated_at",
                params![key.app_id, key.name, key.created_by, version_value, flag(public), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_channel: {e}")))?;

        let mut found = self
            .collect(
                "upsert_channel",
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE app_id = ?1 AND name = ?2 AND created_by = ?3"
                ),
                vec![text(key.app_id), text(key.name), text(key.created_by)],
                row_to_channel,
            )
            .await?;
        found.pop().ok_or_else(|| DatabaseError::NotFound {
            entity: "channel".into(),
            id: format!("{}/{}", key.app_id, key.name),
        })
    }

    // ── Devices, stats, usage ───────────────────────────────────────

    async fn upsert_device(
        &self,
        backend: DataBackend,
        device: &Device,
    ) -> Result<(), DatabaseError> {
        let table = backend.devices_table();
        self.conn()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO {table} ({DEVICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    device.device_id.as_str(),
                    device.app_id.as_str(),
                    device.platform.as_str(),
                    device.os_version.as_str(),
                    device.version,
                    device.version_build.as_str(),
                    device.plugin_version.as_str(),
                    flag(device.is_emulator),
                    flag(device.is_prod),
                    device.custom_id.as_str(),
                    device.created_at.to_rfc3339(),
                    device.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_device({table}): {e}")))?;
        debug!(device_id = %device.device_id, table, "Device upserted");
        Ok(())
    }

    async fn get_device(
        &self,
        backend: DataBackend,
        app_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>, DatabaseError> {
        let (sql, args) = ListFilter::for_app(app_id)
            .eq("device_id", text(device_id))
            .limit(1)
            .to_select(DEVICE_COLUMNS, backend.devices_table());
        let mut found = self.collect("get_device", &sql, args, row_to_device).await?;
        Ok(found.pop())
    }

    async fn list_devices(
        &self,
        backend: DataBackend,
        query: &DeviceQuery,
    ) -> Result<Vec<Device>, DatabaseError> {
        let mut filter = ListFilter::for_app(&query.app_id);
        if let Some(version) = query.version_id {
            filter = filter.eq("version", Value::Integer(version));
        }
        let (sql, args) = filter
            .range(query.range)
            .device_ids(&query.device_ids, true)
            .search(query.search.as_deref(), !query.device_ids.is_empty(), "custom_id")
            .order_by(&query.order, DEVICE_SORTABLE)
            .to_select(DEVICE_COLUMNS, backend.devices_table());
        debug!(%sql, "list_devices");
        self.collect("list_devices", &sql, args, row_to_device).await
    }

    async fn count_devices(
        &self,
        backend: DataBackend,
        app_id: &str,
    ) -> Result<u64, DatabaseError> {
        let (sql, args) = ListFilter::for_app(app_id).to_select("COUNT(*)", backend.devices_table());
        Ok(self.scalar_i64("count_devices", &sql, args).await?.unwrap_or(0) as u64)
    }

    async fn update_device_custom_id(
        &self,
        app_id: &str,
        device_id: &str,
        custom_id: &str,
    ) -> Result<u64, DatabaseError> {
        self.conn()
            .execute(
                "UPDATE devices SET custom_id = ?1, updated_at = ?2 WHERE app_id = ?3 AND device_id = ?4",
                params![custom_id, Utc::now().to_rfc3339(), app_id, device_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_device_custom_id: {e}")))
    }

    async fn insert_stat(&self, backend: DataBackend, stat: &Stat) -> Result<(), DatabaseError> {
        let table = backend.stats_table();
        self.conn()
            .execute(
                &format!("INSERT INTO {table} ({STAT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    stat.app_id.as_str(),
                    stat.device_id.as_str(),
                    stat.action.as_str(),
                    stat.platform.as_str(),
                    stat.version,
                    stat.version_build.as_str(),
                    stat.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_stat({table}): {e}")))?;
        Ok(())
    }

    async fn list_stats(
        &self,
        backend: DataBackend,
        query: &StatsQuery,
    ) -> Result<Vec<Stat>, DatabaseError> {
        let mut filter = ListFilter::for_app(&query.app_id).range(query.range);
        if let Some(after) = query.after {
            filter = filter.gt("created_at", Value::Text(after.to_rfc3339()));
        }
        let (sql, args) = filter
            .device_ids(&query.device_ids, false)
            .search(query.search.as_deref(), !query.device_ids.is_empty(), "action")
            .order_by(&query.order, STAT_SORTABLE)
            .to_select(STAT_COLUMNS, backend.stats_table());
        debug!(%sql, "list_stats");
        self.collect("list_stats", &sql, args, row_to_stat).await
    }

    async fn count_stats(&self, backend: DataBackend, app_id: &str) -> Result<u64, DatabaseError> {
        let (sql, args) = ListFilter::for_app(app_id).to_select("COUNT(*)", backend.stats_table());
        Ok(self.scalar_i64("count_stats", &sql, args).await?.unwrap_or(0) as u64)
    }

    async fn insert_app_usage(
        &self,
        backend: DataBackend,
        usage: &AppUsage,
    ) -> Result<(), DatabaseError> {
        let table = backend.usage_table();
        self.conn()
            .execute(
                &format!("INSERT OR REPLACE INTO {table} ({USAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    usage.app_id.as_str(),
                    usage.date.format(DATE_FORMAT).to_string(),
                    usage.mau,
                    usage.bandwidth,
                    usage.storage_added,
                    usage.storage_deleted,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_app_usage({table}): {e}")))?;
        Ok(())
    }

    async fn list_app_usage(
        &self,
        backend: DataBackend,
        query: &UsageQuery,
    ) -> Result<Vec<AppUsage>, DatabaseError> {
        let mut filter = ListFilter::default().in_list("app_id", &query.app_ids);
        if let Some(start) = query.start_date {
            filter = filter.gt("date", Value::Text(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = query.end_date {
            filter = filter.lt("date", Value::Text(end.format(DATE_FORMAT).to_string()));
        }
        let order = [
            OrderBy::new("date", SortDirection::Asc),
            OrderBy::new("app_id", SortDirection::Asc),
        ];
        let (sql, args) = filter
            .order_by(&order, &["date", "app_id"])
            .to_select(USAGE_COLUMNS, backend.usage_table());
        self.collect("list_app_usage", &sql, args, row_to_usage).await
    }

    // ── Provisioning ────────────────────────────────────────────────

    async fn count_api_keys(&self, user_id: &str) -> Result<u64, DatabaseError> {
        Ok(self
            .scalar_i64(
                "count_api_keys",
                "SELECT COUNT(*) FROM apikeys WHERE user_id = ?1",
                vec![text(user_id)],
            )
            .await?
            .unwrap_or(0) as u64)
    }

    async fn insert_api_keys(&self, keys: &[ApiKey]) -> Result<(), DatabaseError> {
        if keys.is_empty() {
            return Ok(());
        }
        // One statement, so the batch is all-or-nothing.
        let values = vec!["(?, ?, ?, ?)"; keys.len()].join(", ");
        let mut args = Vec::with_capacity(keys.len() * 4);
        for key in keys {
            args.push(text(&key.user_id));
            args.push(text(&key.key));
            args.push(text(key.mode.as_str()));
            args.push(Value::Text(key.created_at.to_rfc3339()));
        }
        self.conn()
            .execute(
                &format!("INSERT INTO apikeys (user_id, key, mode, created_at) VALUES {values}"),
                params_from_iter(args),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_api_keys: {e}")))?;
        Ok(())
    }

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DatabaseError> {
        self.collect(
            "list_api_keys",
            "SELECT user_id, key, mode, created_at FROM apikeys WHERE user_id = ?1 ORDER BY id",
            vec![text(user_id)],
            row_to_api_key,
        )
        .await
    }

    async fn count_orgs_created_by(&self, user_id: &str) -> Result<u64, DatabaseError> {
        Ok(self
            .scalar_i64(
                "count_orgs_created_by",
                "SELECT COUNT(*) FROM orgs WHERE created_by = ?1",
                vec![text(user_id)],
            )
            .await?
            .unwrap_or(0) as u64)
    }

    async fn insert_org(&self, org: &Org) -> Result<Org, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO orgs (id, created_by, logo, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    org.id.as_str(),
                    org.created_by.as_str(),
                    org.logo.as_str(),
                    org.name.as_str(),
                    org.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_org: {e}")))?;
        Ok(org.clone())
    }

    async fn list_orgs_created_by(&self, user_id: &str) -> Result<Vec<Org>, DatabaseError> {
        self.collect(
            "list_orgs_created_by",
            "SELECT id, created_by, logo, name, created_at FROM orgs WHERE created_by = ?1 ORDER BY created_at",
            vec![text(user_id)],
            row_to_org,
        )
        .await
    }

    // ── Store listings ──────────────────────────────────────────────

    async fn upsert_store_apps(&self, apps: &[StoreApp]) -> Result<(), DatabaseError> {
        for app in apps {
            self.conn()
                .execute(
                    "INSERT INTO store_apps (app_id, title, url, icon, developer, installs)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(app_id) DO UPDATE SET
                        title = excluded.title,
                        url = excluded.url,
                        icon = excluded.icon,
                        developer = excluded.developer,
                        installs = excluded.installs",
                    params![
                        app.app_id.as_str(),
                        app.title.as_str(),
                        app.url.as_str(),
                        app.icon.as_str(),
                        app.developer.as_str(),
                        app.installs,
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("upsert_store_apps: {e}")))?;
        }
        Ok(())
    }

    async fn get_store_app(&self, app_id: &str) -> Result<Option<StoreApp>, DatabaseError> {
        let mut found = self
            .collect(
                "get_store_app",
                &format!("SELECT {STORE_APP_COLUMNS} FROM store_apps WHERE app_id = ?1"),
                vec![text(app_id)],
                row_to_store_app,
            )
            .await?;
        Ok(found.pop())
    }

    async fn increment_store(&self, app_id: &str, updates: i64) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO store_apps (app_id, onprem, updates) VALUES (?1, 1, ?2)
                 ON CONFLICT(app_id) DO UPDATE SET onprem = 1, updates = updates + excluded.updates",
                params![app_id, updates],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_store: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::models::{KeyMode, Platform, RowRange, Sortable};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_device(app_id: &str, device_id: &str, custom_id: &str) -> Device {
        let now = Utc::now();
        Device {
            device_id: device_id.into(),
            app_id: app_id.into(),
            platform: Platform::Ios,
            os_version: "17.1".into(),
            version: 1,
            version_build: "1.0.0".into(),
            plugin_version: "5.2.0".into(),
            is_emulator: false,
            is_prod: true,
            custom_id: custom_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_stat(app_id: &str, device_id: &str, action: &str, minutes_ago: i64) -> Stat {
        Stat {
            app_id: app_id.into(),
            device_id: device_id.into(),
            action: action.into(),
            platform: Platform::Android,
            version: 1,
            version_build: "1.0.0".into(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    /// User with a billing record; `status` and `trial_days` drive the facts.
    async fn seed_customer(
        db: &LibSqlBackend,
        user_id: &str,
        status: Option<StripeStatus>,
        trial_days: i64,
        good_plan: bool,
    ) {
        let customer_id = format!("cus_{user_id}");
        let mut user = User::new(user_id, format!("{user_id}@example.com"));
        user.customer_id = Some(customer_id.clone());
        db.insert_user(&user).await.unwrap();

        let mut info = StripeInfo::new_trial(customer_id, Utc::now() + Duration::days(trial_days));
        info.status = status;
        info.is_good_plan = good_plan;
        info.plan_usage = 42.5;
        db.insert_stripe_info(&info).await.unwrap();
    }

    // ── Users & billing ─────────────────────────────────────────────

    #[tokio::test]
    async fn user_roundtrip_and_customer_link() {
        let db = test_db().await;
        let mut user = User::new("u1", "u1@example.com");
        user.first_name = Some("Ada".into());
        db.insert_user(&user).await.unwrap();

        db.set_user_customer_id("u1", "cus_1").await.unwrap();
        let fetched = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(fetched.first_name.as_deref(), Some("Ada"));
        assert_eq!(fetched.last_name, None);
        assert_eq!(fetched.customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn set_customer_on_missing_user_is_not_found() {
        let db = test_db().await;
        let err = db.set_user_customer_id("ghost", "cus").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_stripe_info_is_an_error() {
        let db = test_db().await;
        let info = StripeInfo::new_trial("cus_1", Utc::now());
        db.insert_stripe_info(&info).await.unwrap();
        assert!(db.insert_stripe_info(&info).await.is_err());
        let fetched = db.get_stripe_info("cus_1").await.unwrap().unwrap();
        assert_eq!(fetched.product_id, "free");
        assert!(fetched.is_good_plan);
    }

    #[tokio::test]
    async fn plan_lookup_and_current_plan_name() {
        let db = test_db().await;
        db.insert_plan(&PlanRecord {
            id: "plan_free".into(),
            name: "Free".into(),
            stripe_id: "free".into(),
            price_m_id: "price_free_m".into(),
            price_y_id: "price_free_y".into(),
            price_m: 0,
            price_y: 0,
            mau: 1000,
            storage: 1,
            bandwidth: 10,
        })
        .await
        .unwrap();
        seed_customer(&db, "u1", None, 10, true).await;

        let plan = db.get_plan_by_stripe_id("free").await.unwrap().unwrap();
        assert_eq!(plan.name, "Free");
        assert_eq!(db.current_plan_name("u1").await.unwrap().as_deref(), Some("Free"));
        assert_eq!(db.current_plan_name("nobody").await.unwrap(), None);
        assert!((db.plan_usage_percent("u1").await.unwrap() - 42.5).abs() < f64::EPSILON);
        assert_eq!(db.plan_usage_percent("nobody").await.unwrap(), 0.0);
    }

    // ── Facts ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn facts_from_billing_record() {
        let db = test_db().await;
        seed_customer(&db, "paying", Some(StripeStatus::Succeeded), 0, false).await;
        seed_customer(&db, "canceled", Some(StripeStatus::Canceled), -3, true).await;
        seed_customer(&db, "trial", None, 5, true).await;

        assert!(db.is_paying("paying").await.unwrap());
        assert!(!db.is_good_plan("paying").await.unwrap());
        assert!(!db.is_canceled("paying").await.unwrap());

        assert!(db.is_canceled("canceled").await.unwrap());
        assert!(!db.is_paying("canceled").await.unwrap());
        assert_eq!(db.trial_days_left("canceled").await.unwrap(), 0);

        assert_eq!(db.trial_days_left("trial").await.unwrap(), 5);
        assert!(db.is_good_plan("trial").await.unwrap());

        assert!(!db.is_paying("unknown").await.unwrap());
        assert_eq!(db.trial_days_left("unknown").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn onboarded_requires_app_and_version() {
        let db = test_db().await;
        assert!(!db.is_onboarded("u1").await.unwrap());

        db.insert_app(&App::new("com.demo", "u1")).await.unwrap();
        assert!(!db.is_onboarded("u1").await.unwrap());

        db.upsert_app_version(&AppVersionUpsert {
            app_id: "com.demo".into(),
            name: "1.0.0".into(),
            user_id: "u1".into(),
            bucket_id: None,
            external_url: None,
            checksum: None,
            deleted: false,
        })
        .await
        .unwrap();
        assert!(db.is_onboarded("u1").await.unwrap());
    }

    // ── Rights ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn app_rights() {
        let db = test_db().await;
        db.insert_app(&App::new("com.demo", "owner")).await.unwrap();
        db.add_app_member("com.demo", "reader", AppRight::Read)
            .await
            .unwrap();

        assert!(db.has_app_right("owner", "com.demo", AppRight::Admin).await.unwrap());
        assert!(db.has_app_right("reader", "com.demo", AppRight::Read).await.unwrap());
        assert!(!db.has_app_right("reader", "com.demo", AppRight::Write).await.unwrap());
        assert!(!db.has_app_right("stranger", "com.demo", AppRight::Read).await.unwrap());

        db.add_app_member("com.demo", "reader", AppRight::Write)
            .await
            .unwrap();
        assert!(db.has_app_right("reader", "com.demo", AppRight::Write).await.unwrap());

        assert!(db.is_app_owner("owner", "com.demo").await.unwrap());
        assert!(!db.is_app_owner("reader", "com.demo").await.unwrap());

        assert!(!db.is_admin("root").await.unwrap());
        db.add_admin("root").await.unwrap();
        db.add_admin("root").await.unwrap();
        assert!(db.is_admin("root").await.unwrap());
    }

    // ── Versions & channels ─────────────────────────────────────────

    #[tokio::test]
    async fn version_upsert_updates_in_place() {
        let db = test_db().await;
        let mut upsert = AppVersionUpsert {
            app_id: "com.demo".into(),
            name: "1.0.0".into(),
            user_id: "u1".into(),
            bucket_id: Some("b1".into()),
            external_url: None,
            checksum: None,
            deleted: false,
        };
        let first = db.upsert_app_version(&upsert).await.unwrap();

        upsert.checksum = Some("abc".into());
        upsert.deleted = true;
        let second = db.upsert_app_version(&upsert).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.checksum.as_deref(), Some("abc"));
        assert!(second.deleted);
    }

    #[tokio::test]
    async fn channel_upsert_is_keyed_by_creator() {
        let db = test_db().await;
        let key = ChannelKey {
            app_id: "com.demo",
            name: "production",
            created_by: "u1",
        };
        let a = db.upsert_channel(key.clone(), Some(1), false).await.unwrap();
        let b = db.upsert_channel(key, Some(2), true).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.version, Some(2));
        assert!(b.public);

        let other = db
            .upsert_channel(
                ChannelKey {
                    app_id: "com.demo",
                    name: "production",
                    created_by: "u2",
                },
                None,
                false,
            )
            .await
            .unwrap();
        assert_ne!(other.id, a.id);
        assert_eq!(other.version, None);
    }

    // ── Devices ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn device_tables_are_separate() {
        let db = test_db().await;
        db.upsert_device(DataBackend::Primary, &make_device("a", "d1", ""))
            .await
            .unwrap();
        db.upsert_device(DataBackend::Analytics, &make_device("a", "d2", ""))
            .await
            .unwrap();

        assert_eq!(db.count_devices(DataBackend::Primary, "a").await.unwrap(), 1);
        assert!(db.get_device(DataBackend::Primary, "a", "d2").await.unwrap().is_none());
        assert!(db.get_device(DataBackend::Analytics, "a", "d2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn device_upsert_replaces_row() {
        let db = test_db().await;
        db.upsert_device(DataBackend::Primary, &make_device("a", "d1", "old"))
            .await
            .unwrap();
        db.upsert_device(DataBackend::Primary, &make_device("a", "d1", "new"))
            .await
            .unwrap();
        assert_eq!(db.count_devices(DataBackend::Primary, "a").await.unwrap(), 1);
        let d = db.get_device(DataBackend::Primary, "a", "d1").await.unwrap().unwrap();
        assert_eq!(d.custom_id, "new");
    }

    #[tokio::test]
    async fn list_devices_filters() {
        let db = test_db().await;
        for (id, custom) in [("d1", "alice"), ("d2", "bob"), ("d3", "alice-2"), ("x9", "carol")] {
            db.upsert_device(DataBackend::Primary, &make_device("a", id, custom))
                .await
                .unwrap();
        }
        db.upsert_device(DataBackend::Primary, &make_device("other", "d4", "alice"))
            .await
            .unwrap();

        let all = db
            .list_devices(
                DataBackend::Primary,
                &DeviceQuery {
                    app_id: "a".into(),
                    order: vec![OrderBy::new("device_id", SortDirection::Desc)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["x9", "d3", "d2", "d1"]);

        let searched = db
            .list_devices(
                DataBackend::Primary,
                &DeviceQuery {
                    app_id: "a".into(),
                    search: Some("alice".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.len(), 2);

        // With device ids the search only looks at custom_id.
        let scoped = db
            .list_devices(
                DataBackend::Primary,
                &DeviceQuery {
                    app_id: "a".into(),
                    device_ids: vec!["d1".into(), "d2".into(), "x9".into()],
                    search: Some("x9".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(scoped.is_empty());

        let paged = db
            .list_devices(
                DataBackend::Primary,
                &DeviceQuery {
                    app_id: "a".into(),
                    order: vec![OrderBy {
                        key: "device_id".into(),
                        sortable: Some(Sortable::Direction(SortDirection::Asc)),
                    }],
                    range: Some(RowRange { start: 1, end: 2 }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<_> = paged.iter().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d3"]);
    }

    #[tokio::test]
    async fn custom_id_update_touches_primary_only() {
        let db = test_db().await;
        db.upsert_device(DataBackend::Primary, &make_device("a", "d1", ""))
            .await
            .unwrap();
        assert_eq!(db.update_device_custom_id("a", "d1", "cid").await.unwrap(), 1);
        assert_eq!(db.update_device_custom_id("a", "missing", "cid").await.unwrap(), 0);
        let d = db.get_device(DataBackend::Primary, "a", "d1").await.unwrap().unwrap();
        assert_eq!(d.custom_id, "cid");
    }

    // ── Stats & usage ───────────────────────────────────────────────

    #[tokio::test]
    async fn list_stats_after_and_search() {
        let db = test_db().await;
        db.insert_stat(DataBackend::Primary, &make_stat("a", "d1", "get", 30))
            .await
            .unwrap();
        db.insert_stat(DataBackend::Primary, &make_stat("a", "d1", "set", 10))
            .await
            .unwrap();
        db.insert_stat(DataBackend::Primary, &make_stat("a", "d2", "set_fail", 5))
            .await
            .unwrap();

        let recent = db
            .list_stats(
                DataBackend::Primary,
                &StatsQuery {
                    app_id: "a".into(),
                    after: Some(Utc::now() - Duration::minutes(20)),
                    order: vec![OrderBy::new("created_at", SortDirection::Asc)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let actions: Vec<_> = recent.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["set", "set_fail"]);

        let one_device = db
            .list_stats(
                DataBackend::Primary,
                &StatsQuery {
                    app_id: "a".into(),
                    device_ids: vec!["d1".into()],
                    search: Some("set".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(one_device.len(), 1);
        assert_eq!(one_device[0].action, "set");

        assert_eq!(db.count_stats(DataBackend::Primary, "a").await.unwrap(), 3);
        assert_eq!(db.count_stats(DataBackend::Analytics, "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn usage_date_bounds_are_exclusive() {
        let db = test_db().await;
        for day in 1..=5 {
            db.insert_app_usage(
                DataBackend::Primary,
                &AppUsage {
                    app_id: "a".into(),
                    date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
                    mau: day as i64,
                    bandwidth: 0,
                    storage_added: 0,
                    storage_deleted: 0,
                },
            )
            .await
            .unwrap();
        }
        let rows = db
            .list_app_usage(
                DataBackend::Primary,
                &UsageQuery {
                    app_ids: vec!["a".into()],
                    start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
                    end_date: NaiveDate::from_ymd_opt(2024, 3, 5),
                },
            )
            .await
            .unwrap();
        let maus: Vec<_> = rows.iter().map(|r| r.mau).collect();
        assert_eq!(maus, vec![2, 3, 4]);

        let none = db
            .list_app_usage(DataBackend::Primary, &UsageQuery::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    // ── Provisioning & store ────────────────────────────────────────

    #[tokio::test]
    async fn api_keys_batch() {
        let db = test_db().await;
        let keys: Vec<ApiKey> = [KeyMode::All, KeyMode::Upload, KeyMode::Read]
            .into_iter()
            .enumerate()
            .map(|(i, mode)| ApiKey {
                user_id: "u1".into(),
                key: format!("k{i}"),
                mode,
                created_at: Utc::now(),
            })
            .collect();
        db.insert_api_keys(&keys).await.unwrap();
        assert_eq!(db.count_api_keys("u1").await.unwrap(), 3);
        let listed = db.list_api_keys("u1").await.unwrap();
        assert_eq!(listed[1].mode, KeyMode::Upload);

        // Duplicate key aborts the whole batch.
        let dup = vec![
            ApiKey {
                key: "fresh".into(),
                ..keys[0].clone()
            },
            keys[0].clone(),
        ];
        assert!(db.insert_api_keys(&dup).await.is_err());
        assert_eq!(db.count_api_keys("u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn orgs_by_creator() {
        let db = test_db().await;
        assert_eq!(db.count_orgs_created_by("u1").await.unwrap(), 0);
        db.insert_org(&Org {
            id: "o1".into(),
            created_by: "u1".into(),
            logo: String::new(),
            name: "Default organization".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        assert_eq!(db.count_orgs_created_by("u1").await.unwrap(), 1);
        assert_eq!(db.list_orgs_created_by("u1").await.unwrap()[0].name, "Default organization");
    }

    #[tokio::test]
    async fn store_apps_upsert_and_increment() {
        let db = test_db().await;
        db.increment_store("com.demo", 5).await.unwrap();
        db.increment_store("com.demo", 3).await.unwrap();
        db.upsert_store_apps(&[StoreApp {
            app_id: "com.demo".into(),
            title: "Demo".into(),
            installs: 100,
            ..Default::default()
        }])
        .await
        .unwrap();

        let app = db.get_store_app("com.demo").await.unwrap().unwrap();
        assert_eq!(app.title, "Demo");
        assert_eq!(app.installs, 100);
        assert!(app.onprem);
        assert_eq!(app.updates, 8);
    }

    #[tokio::test]
    async fn open_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("capgo.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(path.exists());
        db.run_migrations().await.unwrap();
    }
}
