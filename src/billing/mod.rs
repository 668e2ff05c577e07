//! Payment-provider seam and customer onboarding.

pub mod customer;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

pub use customer::{create_stripe_customer, get_stripe_customer};
pub use stripe::StripeClient;

/// A customer record created at the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Payment provider operations used by the backend.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer tagged with the backend user id.
    async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
        name: &str,
    ) -> Result<Customer, BillingError>;
}
