//! App versions, channels, ownership and store listings.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::context::Services;
use crate::error::{Error, Result};
use crate::store::ChannelKey;
use crate::store::models::{AppVersion, AppVersionUpsert, Channel, ChannelUpsert, StoreApp};

/// Insert a bundle version or update the one with the same `(app_id, name)`.
pub async fn update_or_create_version(
    services: &Services,
    version: &AppVersionUpsert,
) -> Result<AppVersion> {
    debug!(app_id = %version.app_id, name = %version.name, "Upserting app version");
    Ok(services.db.upsert_app_version(version).await?)
}

/// Insert a channel or update the one with the same `(app_id, name, created_by)`.
pub async fn update_or_create_channel(
    services: &Services,
    channel: &ChannelUpsert,
) -> Result<Channel> {
    let (Some(app_id), Some(name), Some(created_by)) = (
        channel.app_id.as_deref().filter(|s| !s.is_empty()),
        channel.name.as_deref().filter(|s| !s.is_empty()),
        channel.created_by.as_deref().filter(|s| !s.is_empty()),
    ) else {
        warn!(?channel, "Channel upsert without app_id, name or created_by");
        return Err(Error::InvalidInput(
            "missing app_id, name, or created_by".into(),
        ));
    };

    debug!(app_id, name, created_by, "Upserting channel");
    let key = ChannelKey {
        app_id,
        name,
        created_by,
    };
    Ok(services
        .db
        .upsert_channel(key, channel.version, channel.public)
        .await?)
}

/// Whether `user_id` owns `app_id`. Missing ids and lookup errors count as no.
pub async fn check_app_owner(
    services: &Services,
    user_id: Option<&str>,
    app_id: Option<&str>,
) -> bool {
    let (Some(user_id), Some(app_id)) = (user_id, app_id) else {
        return false;
    };
    match services.db.is_app_owner(user_id, app_id).await {
        Ok(owner) => owner,
        Err(e) => {
            error!(user_id, app_id, error = %e, "Owner check failed");
            false
        }
    }
}

/// Save store listings. Repeated app ids keep their first occurrence.
pub async fn save_store_info(services: &Services, apps: &[StoreApp]) {
    if apps.is_empty() {
        return;
    }
    let mut seen = HashSet::new();
    let unique: Vec<StoreApp> = apps
        .iter()
        .filter(|app| seen.insert(app.app_id.clone()))
        .cloned()
        .collect();
    info!(count = unique.len(), "Saving store info");

    if let Err(e) = services.db.upsert_store_apps(&unique).await {
        error!(error = %e, "Failed to save store info");
    }
}

/// Count `updates` against an on-prem app.
pub async fn update_onprem_stats(services: &Services, app_id: &str, updates: i64) {
    if let Err(e) = services.db.increment_store(app_id, updates).await {
        error!(app_id, updates, error = %e, "Failed to increment store stats");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::models::App;
    use crate::store::{Database, LibSqlBackend};

    async fn services() -> (Arc<LibSqlBackend>, Services) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (db.clone(), Services::new(db))
    }

    #[tokio::test]
    async fn channel_requires_identity() {
        let (_, services) = services().await;
        let err = update_or_create_channel(
            &services,
            &ChannelUpsert {
                app_id: Some("com.demo".into()),
                name: Some("production".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let channel = update_or_create_channel(
            &services,
            &ChannelUpsert {
                app_id: Some("com.demo".into()),
                name: Some("production".into()),
                created_by: Some("u1".into()),
                version: Some(7),
                public: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(channel.version, Some(7));
    }

    #[tokio::test]
    async fn version_upsert_is_idempotent() {
        let (_, services) = services().await;
        let upsert = AppVersionUpsert {
            app_id: "com.demo".into(),
            name: "2.0.0".into(),
            user_id: "u1".into(),
            bucket_id: None,
            external_url: Some("https://cdn.example.com/2.0.0.zip".into()),
            checksum: None,
            deleted: false,
        };
        let a = update_or_create_version(&services, &upsert).await.unwrap();
        let b = update_or_create_version(&services, &upsert).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn owner_check() {
        let (db, services) = services().await;
        db.insert_app(&App::new("com.demo", "u1")).await.unwrap();
        assert!(check_app_owner(&services, Some("u1"), Some("com.demo")).await);
        assert!(!check_app_owner(&services, Some("u2"), Some("com.demo")).await);
        assert!(!check_app_owner(&services, None, Some("com.demo")).await);
        assert!(!check_app_owner(&services, Some("u1"), None).await);
    }

    #[tokio::test]
    async fn store_info_first_occurrence_wins() {
        let (db, services) = services().await;
        save_store_info(&services, &[]).await;
        save_store_info(
            &services,
            &[
                StoreApp {
                    app_id: "com.a".into(),
                    title: "First".into(),
                    ..Default::default()
                },
                StoreApp {
                    app_id: "com.b".into(),
                    title: "Other".into(),
                    ..Default::default()
                },
                StoreApp {
                    app_id: "com.a".into(),
                    title: "Second".into(),
                    ..Default::default()
                },
            ],
        )
        .await;
        assert_eq!(db.get_store_app("com.a").await.unwrap().unwrap().title, "First");
        assert!(db.get_store_app("com.b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn onprem_counter() {
        let (db, services) = services().await;
        update_onprem_stats(&services, "com.selfhost", 2).await;
        update_onprem_stats(&services, "com.selfhost", 3).await;
        let app = db.get_store_app("com.selfhost").await.unwrap().unwrap();
        assert!(app.onprem);
        assert_eq!(app.updates, 5);
    }
}
