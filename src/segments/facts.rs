//! Fact gathering for the segment classifier.
//!
//! Each fact comes from an independent lookup. Lookups run concurrently and
//! a failed lookup falls back to its conservative default (`false` / `0`)
//! after being logged, so one broken lookup never blocks the others.

use async_trait::async_trait;
use tracing::error;

use crate::error::DatabaseError;
use crate::segments::classifier::{Plan, Segment, UserPlanFacts, classify};

/// Per-user lookups feeding the classifier.
#[async_trait]
pub trait FactSource: Send + Sync {
    /// User has created an app and uploaded a bundle.
    async fn is_onboarded(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Subscription was canceled.
    async fn is_canceled(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Remaining trial days, zero once the trial is over.
    async fn trial_days_left(&self, user_id: &str) -> Result<u32, DatabaseError>;

    /// Subscription is active and paid.
    async fn is_paying(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Usage still fits the current plan.
    async fn is_good_plan(&self, user_id: &str) -> Result<bool, DatabaseError>;
}

/// Log a failed lookup and substitute the default value.
fn fail_closed<T: Default>(fact: &'static str, user_id: &str, result: Result<T, DatabaseError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!(user_id, fact, error = %e, "Fact lookup failed, using default");
            T::default()
        }
    }
}

/// Resolve every classifier input for `user_id`.
///
/// `plan` and `customer_price_id` come from records the caller already holds.
pub async fn gather_facts<S: FactSource + ?Sized>(
    source: &S,
    user_id: &str,
    customer_price_id: &str,
    plan: Option<Plan>,
) -> UserPlanFacts {
    let (onboarded, canceled, trial_days_left, is_paying, can_use_more) = tokio::join!(
        source.is_onboarded(user_id),
        source.is_canceled(user_id),
        source.trial_days_left(user_id),
        source.is_paying(user_id),
        source.is_good_plan(user_id),
    );

    UserPlanFacts {
        onboarded: fail_closed("onboarded", user_id, onboarded),
        canceled: fail_closed("canceled", user_id, canceled),
        trial_days_left: fail_closed("trial_days_left", user_id, trial_days_left),
        is_paying: fail_closed("paying", user_id, is_paying),
        can_use_more: fail_closed("good_plan", user_id, can_use_more),
        plan,
        customer_price_id: customer_price_id.to_string(),
    }
}

/// Gather the facts for a user and classify them.
pub async fn segment_for_user<S: FactSource + ?Sized>(
    source: &S,
    user_id: &str,
    customer_price_id: &str,
    plan: Option<Plan>,
) -> Segment {
    let facts = gather_facts(source, user_id, customer_price_id, plan).await;
    classify(&facts)
}

/// Paying with headroom, or still inside the trial.
pub async fn is_allowed_action<S: FactSource + ?Sized>(source: &S, user_id: &str) -> bool {
    let (paying, good_plan, trial) = tokio::join!(
        source.is_paying(user_id),
        source.is_good_plan(user_id),
        source.trial_days_left(user_id),
    );
    let paying = fail_closed("paying", user_id, paying);
    let good_plan = fail_closed("good_plan", user_id, good_plan);
    let trial = fail_closed("trial_days_left", user_id, trial);
    (paying && good_plan) || trial > 0
}

/// Not onboarded and no trial left.
pub async fn is_onboarding_needed<S: FactSource + ?Sized>(source: &S, user_id: &str) -> bool {
    let (onboarded, trial) = tokio::join!(
        source.is_onboarded(user_id),
        source.trial_days_left(user_id),
    );
    let onboarded = match onboarded {
        Ok(v) => v,
        Err(e) => {
            error!(user_id, fact = "onboarded", error = %e, "Fact lookup failed, using default");
            // Unknown onboarding state must not trigger the onboarding flow.
            return false;
        }
    };
    !onboarded && fail_closed("trial_days_left", user_id, trial) == 0
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted facts; `None` makes the lookup fail.
    #[derive(Default)]
    struct StubFacts {
        onboarded: Option<bool>,
        canceled: Option<bool>,
        trial: Option<u32>,
        paying: Option<bool>,
        good_plan: Option<bool>,
        calls: AtomicUsize,
    }

    impl StubFacts {
        fn answer<T: Copy>(&self, value: Option<T>, what: &str) -> Result<T, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            value.ok_or_else(|| DatabaseError::Query(format!("{what} unavailable")))
        }
    }

    #[async_trait]
    impl FactSource for StubFacts {
        async fn is_onboarded(&self, _user_id: &str) -> Result<bool, DatabaseError> {
            self.answer(self.onboarded, "is_onboarded")
        }
        async fn is_canceled(&self, _user_id: &str) -> Result<bool, DatabaseError> {
            self.answer(self.canceled, "is_canceled")
        }
        async fn trial_days_left(&self, _user_id: &str) -> Result<u32, DatabaseError> {
            self.answer(self.trial, "is_trial")
        }
        async fn is_paying(&self, _user_id: &str) -> Result<bool, DatabaseError> {
            self.answer(self.paying, "is_paying")
        }
        async fn is_good_plan(&self, _user_id: &str) -> Result<bool, DatabaseError> {
            self.answer(self.good_plan, "is_good_plan")
        }
    }

    #[tokio::test]
    async fn gathers_all_facts() {
        let stub = StubFacts {
            onboarded: Some(true),
            canceled: Some(true),
            trial: Some(4),
            paying: Some(false),
            good_plan: Some(true),
            ..Default::default()
        };
        let facts = gather_facts(&stub, "u1", "price_1", None).await;
        assert!(facts.onboarded);
        assert!(facts.canceled);
        assert_eq!(facts.trial_days_left, 4);
        assert!(!facts.is_paying);
        assert!(facts.can_use_more);
        assert_eq!(facts.customer_price_id, "price_1");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failed_lookups_fail_closed_without_blocking_others() {
        let stub = StubFacts {
            onboarded: Some(true),
            canceled: None,
            trial: None,
            paying: Some(true),
            good_plan: None,
            ..Default::default()
        };
        let facts = gather_facts(&stub, "u1", "", None).await;
        assert!(facts.onboarded);
        assert!(!facts.canceled);
        assert_eq!(facts.trial_days_left, 0);
        assert!(facts.is_paying);
        assert!(!facts.can_use_more);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn everything_failing_yields_not_onboarded_segment() {
        let stub = StubFacts::default();
        let segment = segment_for_user(&stub, "u1", "", None).await;
        assert!(!segment.onboarded);
        assert!(!segment.issue_segment);
        assert!(!segment.trial);
    }

    #[tokio::test]
    async fn segment_for_paying_user() {
        let stub = StubFacts {
            onboarded: Some(true),
            canceled: Some(false),
            trial: Some(0),
            paying: Some(true),
            good_plan: Some(false),
            ..Default::default()
        };
        let plan = Plan {
            name: "Solo".into(),
            price_monthly_id: "m1".into(),
        };
        let segment = segment_for_user(&stub, "u1", "m1", Some(plan)).await;
        assert!(segment.overuse && segment.paying && segment.paying_monthly);
        assert_eq!(segment.plan, "Solo");
    }

    #[tokio::test]
    async fn allowed_action_rules() {
        let trial = StubFacts {
            trial: Some(3),
            paying: Some(false),
            good_plan: Some(false),
            ..Default::default()
        };
        assert!(is_allowed_action(&trial, "u").await);

        let paying_good = StubFacts {
            trial: Some(0),
            paying: Some(true),
            good_plan: Some(true),
            ..Default::default()
        };
        assert!(is_allowed_action(&paying_good, "u").await);

        let broken = StubFacts::default();
        assert!(!is_allowed_action(&broken, "u").await);
    }

    #[tokio::test]
    async fn onboarding_needed_rules() {
        let fresh = StubFacts {
            onboarded: Some(false),
            trial: Some(0),
            ..Default::default()
        };
        assert!(is_onboarding_needed(&fresh, "u").await);

        let in_trial = StubFacts {
            onboarded: Some(false),
            trial: Some(5),
            ..Default::default()
        };
        assert!(!is_onboarding_needed(&in_trial, "u").await);

        let unknown = StubFacts {
            onboarded: None,
            trial: Some(0),
            ..Default::default()
        };
        assert!(!is_onboarding_needed(&unknown, "u").await);
    }
}
