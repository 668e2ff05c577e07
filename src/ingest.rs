//! Device and update-event writes.
//!
//! Writes go to the analytics sink when the request has analytics enabled,
//! to the primary store otherwise. Without a configured sink, analytics
//! writes land in the local analytics mirror tables.

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::access::ensure_app_right;
use crate::context::{RequestContext, Services};
use crate::error::{Error, Result};
use crate::store::models::{AppRight, DataBackend, Device, DeviceUpdate, Platform, Stat, StatUpdate};

/// Fill in the defaults of a partial device. Missing timestamps become now,
/// missing flags false.
fn complete_device(update: DeviceUpdate) -> Device {
    let now = Utc::now();
    Device {
        device_id: update.device_id.unwrap_or_default(),
        app_id: update.app_id.unwrap_or_default(),
        platform: update.platform.unwrap_or(Platform::Ios),
        os_version: update.os_version.unwrap_or_default(),
        version: update.version.unwrap_or_default(),
        version_build: update.version_build.unwrap_or_default(),
        plugin_version: update.plugin_version.unwrap_or_default(),
        is_emulator: update.is_emulator.unwrap_or(false),
        is_prod: update.is_prod.unwrap_or(false),
        custom_id: update.custom_id.unwrap_or_default(),
        created_at: update.created_at.unwrap_or(now),
        updated_at: update.updated_at.unwrap_or(now),
    }
}

fn complete_stat(update: StatUpdate) -> Stat {
    Stat {
        app_id: update.app_id.unwrap_or_default(),
        device_id: update.device_id.unwrap_or_default(),
        action: update.action.unwrap_or_default(),
        platform: update.platform.unwrap_or(Platform::Ios),
        version: update.version.unwrap_or_default(),
        version_build: update.version_build.unwrap_or_default(),
        created_at: update.created_at.unwrap_or_else(Utc::now),
    }
}

async fn write_device(services: &Services, ctx: &RequestContext, device: &Device) -> Result<()> {
    match (ctx.analytics_enabled, &services.analytics) {
        (true, Some(sink)) => sink.send_devices(std::slice::from_ref(device)).await?,
        (true, None) => services.db.upsert_device(DataBackend::Analytics, device).await?,
        (false, _) => services.db.upsert_device(DataBackend::Primary, device).await?,
    }
    Ok(())
}

async fn write_stat(services: &Services, ctx: &RequestContext, stat: &Stat) -> Result<()> {
    match (ctx.analytics_enabled, &services.analytics) {
        (true, Some(sink)) => sink.send_logs(std::slice::from_ref(stat)).await?,
        (true, None) => services.db.insert_stat(DataBackend::Analytics, stat).await?,
        (false, _) => services.db.insert_stat(DataBackend::Primary, stat).await?,
    }
    Ok(())
}

/// Record a device. Failures are logged, never returned.
pub async fn send_device(services: &Services, ctx: &RequestContext, update: DeviceUpdate) {
    let device = complete_device(update);
    match write_device(services, ctx, &device).await {
        Ok(()) => debug!(device_id = %device.device_id, app_id = %device.app_id, "Device recorded"),
        Err(e) => error!(device_id = %device.device_id, app_id = %device.app_id, error = %e, "Failed to record device"),
    }
}

/// Record update events, one concurrent write per event. Failures are logged.
pub async fn send_stats(services: &Services, ctx: &RequestContext, updates: Vec<StatUpdate>) {
    let stats: Vec<Stat> = updates.into_iter().map(complete_stat).collect();
    let results = join_all(stats.iter().map(|stat| write_stat(services, ctx, stat))).await;
    for (stat, result) in stats.iter().zip(results) {
        if let Err(e) = result {
            error!(device_id = %stat.device_id, action = %stat.action, error = %e, "Failed to record stat");
        }
    }
}

/// Set the custom id of a device.
///
/// The caller must hold `write` on the app (or be an admin) before anything
/// is written. The primary row is always updated; with analytics enabled the
/// device is also re-sent to the analytics backend with its new custom id.
pub async fn update_device_custom_id(
    services: &Services,
    ctx: &RequestContext,
    app_id: &str,
    device_id: &str,
    custom_id: &str,
) -> Result<()> {
    info!(app_id, device_id, custom_id, "Updating device custom id");
    let db = services.db.as_ref();
    ensure_app_right(db, ctx, app_id, AppRight::Write).await?;
    db.update_device_custom_id(app_id, device_id, custom_id)
        .await?;

    if !ctx.analytics_enabled {
        return Ok(());
    }

    let mut device = db
        .get_device(DataBackend::Analytics, app_id, device_id)
        .await?
        .ok_or_else(|| Error::DeviceNotFound {
            app_id: app_id.to_string(),
            device_id: device_id.to_string(),
        })?;
    device.custom_id = custom_id.to_string();
    write_device(services, ctx, &device).await
}
