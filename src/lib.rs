//! Capgo backend: billing segmentation, dual-backend listings and account
//! provisioning for a live-update distribution service.

pub mod access;
pub mod analytics;
pub mod billing;
pub mod catalog;
pub mod config;
pub mod contacts;
pub mod context;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod provisioning;
pub mod queries;
pub mod segments;
pub mod store;
