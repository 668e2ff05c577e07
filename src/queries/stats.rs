//! Update-event (stats) listing.

use tracing::debug;

use crate::access::ensure_app_right;
use crate::context::{RequestContext, Services};
use crate::error::Result;
use crate::queries::Page;
use crate::store::models::{AppRight, DataBackend, Stat, StatsQuery};

/// List the update events of an app.
pub async fn get_stats(
    services: &Services,
    ctx: &RequestContext,
    query: &StatsQuery,
    count: bool,
) -> Result<Page<Stat>> {
    let db = services.db.as_ref();
    ensure_app_right(db, ctx, &query.app_id, AppRight::Read).await?;

    let backend = DataBackend::from_flag(ctx.analytics_enabled);
    debug!(app_id = %query.app_id, ?backend, count, "Listing stats");

    if !count {
        let data = db.list_stats(backend, query).await?;
        return Ok(Page::new(None, data));
    }

    let (total, data) = tokio::join!(
        db.count_stats(backend, &query.app_id),
        db.list_stats(backend, query),
    );
    Ok(Page::new(Some(total?), data?))
}
