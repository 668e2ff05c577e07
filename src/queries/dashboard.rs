//! Daily usage dashboard.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::access::{ensure_app_right, is_admin_caller};
use crate::context::{RequestContext, Services};
use crate::error::{Error, Result};
use crate::store::models::{AppRight, AppUsage, DataBackend, UsageQuery};

/// Dashboard request. Dates accept RFC 3339 timestamps or `YYYY-MM-DD`.
#[derive(Debug, Clone, Default)]
pub struct DashboardQuery {
    /// User whose apps are listed; honored for admins only.
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Truncate a date or timestamp to its UTC calendar day.
fn parse_day(raw: &str) -> Result<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| Error::InvalidInput(format!("invalid date: {raw}")))
}

fn parse_bound(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.filter(|s| !s.is_empty()).map(parse_day).transpose()
}

/// Usage rows of one app, or of every app of the target user, strictly
/// between the start and end days.
pub async fn get_dashboard(
    services: &Services,
    ctx: &RequestContext,
    query: &DashboardQuery,
) -> Result<Vec<AppUsage>> {
    let db = services.db.as_ref();
    let start_date = parse_bound(query.start_date.as_deref())?;
    let end_date = parse_bound(query.end_date.as_deref())?;

    let app_ids = match query.app_id.as_deref() {
        Some(app_id) => {
            ensure_app_right(db, ctx, app_id, AppRight::Read).await?;
            vec![app_id.to_string()]
        }
        None => {
            let target = if is_admin_caller(db, ctx).await? {
                query.user_id.as_deref().or(ctx.user_id())
            } else {
                ctx.user_id()
            };
            let Some(target) = target else {
                debug!("Dashboard requested without a user, returning nothing");
                return Ok(Vec::new());
            };
            db.list_app_ids(target).await?
        }
    };

    let backend = DataBackend::from_flag(ctx.analytics_enabled);
    let usage = db
        .list_app_usage(
            backend,
            &UsageQuery {
                app_ids,
                start_date,
                end_date,
            },
        )
        .await?;
    Ok(usage)
}
