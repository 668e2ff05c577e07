//! Plan segment classifier: maps a user's billing facts to exactly one
//! marketing/billing segment.

use serde::{Deserialize, Serialize};

use crate::store::models::PlanRecord;

/// A billing tier as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub price_monthly_id: String,
}

impl From<&PlanRecord> for Plan {
    fn from(record: &PlanRecord) -> Self {
        Self {
            name: record.name.clone(),
            price_monthly_id: record.price_m_id.clone(),
        }
    }
}

/// Resolved inputs for one classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPlanFacts {
    pub onboarded: bool,
    pub canceled: bool,
    pub trial_days_left: u32,
    pub is_paying: bool,
    /// Plan usage still has headroom.
    pub can_use_more: bool,
    pub plan: Option<Plan>,
    /// Price id of the customer's current subscription.
    pub customer_price_id: String,
}

/// Segment flags forwarded to the contact service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub capgo: bool,
    pub onboarded: bool,
    pub trial: bool,
    pub trial7: bool,
    pub trial1: bool,
    pub trial0: bool,
    pub paying: bool,
    pub paying_monthly: bool,
    pub plan: String,
    pub overuse: bool,
    pub canceled: bool,
    pub issue_segment: bool,
}

/// Classify a user. Branches are evaluated in order and the first match wins.
///
/// A paying user without a resolved plan lands in `issue_segment`.
pub fn classify(facts: &UserPlanFacts) -> Segment {
    let mut segment = Segment {
        capgo: true,
        onboarded: facts.onboarded,
        trial: false,
        trial7: false,
        trial1: false,
        trial0: false,
        paying: false,
        paying_monthly: facts
            .plan
            .as_ref()
            .is_some_and(|p| p.price_monthly_id == facts.customer_price_id),
        plan: facts
            .plan
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default(),
        overuse: false,
        canceled: facts.canceled,
        issue_segment: false,
    };

    if !segment.onboarded {
        return segment;
    }

    let paying = facts.is_paying;
    let days = facts.trial_days_left;
    let has_plan = facts.plan.is_some();

    if !paying && days > 1 && days <= 7 {
        segment.trial = true;
        segment.trial7 = true;
    } else if !paying && days == 1 {
        segment.trial = true;
        segment.trial1 = true;
    } else if !paying && !facts.can_use_more {
        segment.trial = true;
        segment.trial0 = true;
    } else if paying && !facts.can_use_more && has_plan {
        segment.overuse = true;
        segment.paying = true;
    } else if paying && facts.can_use_more && has_plan {
        segment.paying = true;
    } else {
        segment.issue_segment = true;
    }

    segment
}
