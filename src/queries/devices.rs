//! Device listing.

use tracing::debug;

use crate::access::ensure_app_right;
use crate::context::{RequestContext, Services};
use crate::error::Result;
use crate::queries::Page;
use crate::store::models::{AppRight, DataBackend, Device, DeviceQuery};

/// List the devices of an app.
///
/// With `count`, the total number of devices of the app is fetched
/// concurrently with the page.
pub async fn get_devices(
    services: &Services,
    ctx: &RequestContext,
    query: &DeviceQuery,
    count: bool,
) -> Result<Page<Device>> {
    let db = services.db.as_ref();
    ensure_app_right(db, ctx, &query.app_id, AppRight::Read).await?;

    let backend = DataBackend::from_flag(ctx.analytics_enabled);
    debug!(app_id = %query.app_id, ?backend, count, "Listing devices");

    if !count {
        let data = db.list_devices(backend, query).await?;
        return Ok(Page::new(None, data));
    }

    let (total, data) = tokio::join!(
        db.count_devices(backend, &query.app_id),
        db.list_devices(backend, query),
    );
    Ok(Page::new(Some(total?), data?))
}
