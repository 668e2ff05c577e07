//! Default resources for new users.

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::Services;
use crate::error::Result;
use crate::store::models::{ApiKey, KeyMode, Org};

/// Modes of the keys handed to every new user.
const DEFAULT_KEY_MODES: [KeyMode; 3] = [KeyMode::All, KeyMode::Upload, KeyMode::Read];

/// Default organization name prefix.
pub const DEFAULT_ORG_NAME: &str = "Default";

/// Give the user one API key per default mode, unless they already have keys.
pub async fn create_api_keys(services: &Services, user_id: &str) -> Result<()> {
    let existing = services.db.count_api_keys(user_id).await?;
    if existing > 0 {
        debug!(user_id, existing, "User already has API keys");
        return Ok(());
    }

    let now = Utc::now();
    let keys: Vec<ApiKey> = DEFAULT_KEY_MODES
        .into_iter()
        .map(|mode| ApiKey {
            user_id: user_id.to_string(),
            key: Uuid::new_v4().to_string(),
            mode,
            created_at: now,
        })
        .collect();
    services.db.insert_api_keys(&keys).await?;
    info!(user_id, "Default API keys created");
    Ok(())
}

/// Create `"{name} organization"` for the user unless they already created one.
///
/// Insert failures are logged, not returned.
pub async fn create_default_org(services: &Services, user_id: &str, name: &str) -> Result<()> {
    let existing = services.db.count_orgs_created_by(user_id).await?;
    if existing > 0 {
        debug!(user_id, existing, "User already owns an organization");
        return Ok(());
    }

    let org = Org {
        id: Uuid::new_v4().to_string(),
        created_by: user_id.to_string(),
        logo: String::new(),
        name: format!("{name} organization"),
        created_at: Utc::now(),
    };
    match services.db.insert_org(&org).await {
        Ok(org) => info!(user_id, org_id = %org.id, "Default organization created"),
        Err(e) => error!(user_id, error = %e, "Failed to create default organization"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{Database, LibSqlBackend};

    async fn setup() -> (Arc<LibSqlBackend>, Services) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (db.clone(), Services::new(db))
    }

    #[tokio::test]
    async fn api_keys_created_once() {
        let (db, services) = setup().await;
        create_api_keys(&services, "u1").await.unwrap();
        create_api_keys(&services, "u1").await.unwrap();

        let keys = db.list_api_keys("u1").await.unwrap();
        let modes: Vec<_> = keys.iter().map(|k| k.mode).collect();
        assert_eq!(modes, vec![KeyMode::All, KeyMode::Upload, KeyMode::Read]);
        assert!(keys.iter().all(|k| Uuid::parse_str(&k.key).is_ok()));
        assert_ne!(keys[0].key, keys[1].key);
    }

    #[tokio::test]
    async fn default_org_created_once() {
        let (db, services) = setup().await;
        create_default_org(&services, "u1", DEFAULT_ORG_NAME).await.unwrap();
        create_default_org(&services, "u1", "Other").await.unwrap();

        let orgs = db.list_orgs_created_by("u1").await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].name, "Default organization");
        assert_eq!(orgs[0].logo, "");
    }

    #[tokio::test]
    async fn custom_org_name() {
        let (db, services) = setup().await;
        create_default_org(&services, "u2", "Acme").await.unwrap();
        assert_eq!(db.list_orgs_created_by("u2").await.unwrap()[0].name, "Acme organization");
    }
}
