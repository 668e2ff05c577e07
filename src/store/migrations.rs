//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "accounts_and_billing",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT,
                last_name TEXT,
                image_url TEXT,
                country TEXT,
                customer_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_customer ON users(customer_id);

            CREATE TABLE IF NOT EXISTS stripe_info (
                customer_id TEXT PRIMARY KEY,
                status TEXT,
                product_id TEXT NOT NULL DEFAULT 'free',
                price_id TEXT,
                subscription_id TEXT,
                trial_at TEXT NOT NULL,
                is_good_plan INTEGER NOT NULL DEFAULT 1,
                plan_usage REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                stripe_id TEXT NOT NULL UNIQUE,
                price_m_id TEXT NOT NULL,
                price_y_id TEXT NOT NULL,
                price_m INTEGER NOT NULL DEFAULT 0,
                price_y INTEGER NOT NULL DEFAULT 0,
                mau INTEGER NOT NULL DEFAULT 0,
                storage INTEGER NOT NULL DEFAULT 0,
                bandwidth INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS admin_users (
                user_id TEXT PRIMARY KEY
            );
        "#,
    },
    Migration {
        version: 2,
        name: "apps_and_bundles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS apps (
                app_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                icon_url TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_apps_user ON apps(user_id);

            CREATE TABLE IF NOT EXISTS app_members (
                app_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                right_rank INTEGER NOT NULL,
                PRIMARY KEY (app_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS app_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                bucket_id TEXT,
                external_url TEXT,
                checksum TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (app_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_app_versions_user ON app_versions(user_id);

            CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                version INTEGER,
                public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (app_id, name, created_by)
            );
        "#,
    },
    Migration {
        version: 3,
        name: "devices_stats_usage",
        sql: r#"
            CREATE TABLE IF NOT EXISTS devices (
                device_id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                os_version TEXT NOT NULL,
                version INTEGER NOT NULL,
                version_build TEXT NOT NULL,
                plugin_version TEXT NOT NULL,
                is_emulator INTEGER NOT NULL DEFAULT 0,
                is_prod INTEGER NOT NULL DEFAULT 1,
                custom_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_devices_app ON devices(app_id);

            CREATE TABLE IF NOT EXISTS clickhouse_devices (
                device_id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                os_version TEXT NOT NULL,
                version INTEGER NOT NULL,
                version_build TEXT NOT NULL,
                plugin_version TEXT NOT NULL,
                is_emulator INTEGER NOT NULL DEFAULT 0,
                is_prod INTEGER NOT NULL DEFAULT 1,
                custom_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clickhouse_devices_app ON clickhouse_devices(app_id);

            CREATE TABLE IF NOT EXISTS stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                action TEXT NOT NULL,
                platform TEXT NOT NULL,
                version INTEGER NOT NULL,
                version_build TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stats_app ON stats(app_id, created_at);

            CREATE TABLE IF NOT EXISTS clickhouse_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                action TEXT NOT NULL,
                platform TEXT NOT NULL,
                version INTEGER NOT NULL,
                version_build TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clickhouse_logs_app ON clickhouse_logs(app_id, created_at);

            CREATE TABLE IF NOT EXISTS app_usage (
                app_id TEXT NOT NULL,
                date TEXT NOT NULL,
                mau INTEGER NOT NULL DEFAULT 0,
                bandwidth INTEGER NOT NULL DEFAULT 0,
                storage_added INTEGER NOT NULL DEFAULT 0,
                storage_deleted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (app_id, date)
            );

            CREATE TABLE IF NOT EXISTS clickhouse_app_usage (
                app_id TEXT NOT NULL,
                date TEXT NOT NULL,
                mau INTEGER NOT NULL DEFAULT 0,
                bandwidth INTEGER NOT NULL DEFAULT 0,
                storage_added INTEGER NOT NULL DEFAULT 0,
                storage_deleted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (app_id, date)
            );
        "#,
    },
    Migration {
        version: 4,
        name: "provisioning_and_store",
        sql: r#"
            CREATE TABLE IF NOT EXISTS apikeys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                key TEXT NOT NULL UNIQUE,
                mode TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_apikeys_user ON apikeys(user_id);

            CREATE TABLE IF NOT EXISTS orgs (
                id TEXT PRIMARY KEY,
                created_by TEXT NOT NULL,
                logo TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orgs_created_by ON orgs(created_by);

            CREATE TABLE IF NOT EXISTS store_apps (
                app_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT '',
                developer TEXT NOT NULL DEFAULT '',
                installs INTEGER NOT NULL DEFAULT 0,
                onprem INTEGER NOT NULL DEFAULT 0,
                updates INTEGER NOT NULL DEFAULT 0
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
