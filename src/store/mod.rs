//! Persistence layer: libSQL-backed storage for accounts, apps, devices and usage.

pub mod filter;
pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChannelKey, Database};
