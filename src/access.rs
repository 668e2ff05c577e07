//! App-scoped authorization checks.

use tracing::warn;

use crate::context::RequestContext;
use crate::error::{AccessError, DatabaseError, Result};
use crate::store::Database;
use crate::store::models::AppRight;

/// Require the caller to hold `right` on `app_id`, or to be an admin.
///
/// Service-role requests (no authenticated user) always pass.
pub async fn ensure_app_right(
    db: &dyn Database,
    ctx: &RequestContext,
    app_id: &str,
    right: AppRight,
) -> Result<()> {
    let Some(user_id) = ctx.user_id() else {
        return Ok(());
    };

    let (has_right, is_admin) = tokio::join!(
        db.has_app_right(user_id, app_id, right),
        db.is_admin(user_id),
    );
    if is_granted(has_right, is_admin)? {
        return Ok(());
    }

    warn!(user_id, app_id, right = %right, "App access denied");
    Err(AccessError::NotAllowed {
        user_id: user_id.to_string(),
        app_id: app_id.to_string(),
        right: right.to_string(),
    }
    .into())
}

/// Either grant is enough; a failed lookup only matters when the other
/// one did not grant access.
fn is_granted(
    has_right: std::result::Result<bool, DatabaseError>,
    is_admin: std::result::Result<bool, DatabaseError>,
) -> std::result::Result<bool, DatabaseError> {
    match (has_right, is_admin) {
        (Ok(true), _) | (_, Ok(true)) => Ok(true),
        (Err(e), _) | (_, Err(e)) => Err(e),
        _ => Ok(false),
    }
}

/// Whether the authenticated caller is an admin. Service role counts as admin.
pub async fn is_admin_caller(db: &dyn Database, ctx: &RequestContext) -> Result<bool> {
    match ctx.user_id() {
        Some(user_id) => Ok(db.is_admin(user_id).await?),
        None => Ok(true),
    }
}
