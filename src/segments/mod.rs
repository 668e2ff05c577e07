//! Billing/marketing segmentation of users.

pub mod classifier;
pub mod facts;

pub use classifier::{Plan, Segment, UserPlanFacts, classify};
pub use facts::{FactSource, gather_facts, is_allowed_action, is_onboarding_needed, segment_for_user};
