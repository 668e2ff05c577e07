//! Request context and shared service handles.

use std::sync::Arc;

use crate::analytics::AnalyticsSink;
use crate::billing::PaymentProvider;
use crate::config::{AppConfig, DEFAULT_TRIAL_DAYS};
use crate::contacts::ContactSink;
use crate::store::Database;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Per-request context.
///
/// `auth == None` means the request runs with service-role privileges.
/// `analytics_enabled` selects the analytics tables and sink instead of the
/// primary store for device, stats and usage data.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub auth: Option<AuthUser>,
    pub analytics_enabled: bool,
}

impl RequestContext {
    /// Service-role context (no authenticated user).
    pub fn service(analytics_enabled: bool) -> Self {
        Self {
            auth: None,
            analytics_enabled,
        }
    }

    /// Context for an authenticated user.
    pub fn user(user_id: impl Into<String>, analytics_enabled: bool) -> Self {
        Self {
            auth: Some(AuthUser {
                user_id: user_id.into(),
            }),
            analytics_enabled,
        }
    }

    /// Service-role context with the analytics flag taken from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::service(config.analytics_enabled())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.user_id.as_str())
    }
}

/// External collaborators shared by every request.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<dyn Database>,
    pub analytics: Option<Arc<dyn AnalyticsSink>>,
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub contacts: Option<Arc<dyn ContactSink>>,
    /// Trial length granted to new customers, in days.
    pub trial_days: i64,
}

impl Services {
    /// Services backed only by the database; integrations can be attached afterwards.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            analytics: None,
            payments: None,
            contacts: None,
            trial_days: DEFAULT_TRIAL_DAYS,
        }
    }

    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(sink);
        self
    }

    pub fn with_payments(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.payments = Some(provider);
        self
    }

    pub fn with_contacts(mut self, sink: Arc<dyn ContactSink>) -> Self {
        self.contacts = Some(sink);
        self
    }

    pub fn with_trial_days(mut self, days: i64) -> Self {
        self.trial_days = days;
        self
    }
}
