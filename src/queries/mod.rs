//! Read-side listings with dual-backend routing.
//!
//! The [`RequestContext`](crate::context::RequestContext) decides whether a
//! listing reads the primary tables or the analytics mirror; the filter
//! building in [`crate::store::filter`] is shared by both.

pub mod dashboard;
pub mod devices;
pub mod stats;

use serde::Serialize;

pub use dashboard::{DashboardQuery, get_dashboard};
pub use devices::get_devices;
pub use stats::get_stats;

/// One page of a listing. `count` is only filled when it was requested and
/// covers the whole app, not just the filtered rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: Option<u64>,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: Option<u64>, data: Vec<T>) -> Self {
        Self { count, data }
    }
}
