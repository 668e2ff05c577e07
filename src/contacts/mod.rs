//! Contact/marketing service seam.

pub mod plunk;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ContactError;
use crate::segments::Segment;
use crate::store::models::{StripeInfo, User};

pub use plunk::PlunkClient;

/// Contact profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub product_id: String,
    pub customer_id: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Build the contact profile from a user and their billing record.
pub fn user_to_person(user: &User, customer: &StripeInfo) -> Person {
    Person {
        id: user.id.clone(),
        product_id: customer.product_id.clone(),
        customer_id: customer.customer_id.clone(),
        nickname: user.display_name(),
        avatar: user.image_url.clone().filter(|s| !s.is_empty()),
        country: user.country.clone().filter(|s| !s.is_empty()),
    }
}

/// Person and segment flags, sent as one flat object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactData {
    #[serde(flatten)]
    pub person: Person,
    #[serde(flatten)]
    pub segment: Segment,
}

/// Contact service operations.
#[async_trait]
pub trait ContactSink: Send + Sync {
    /// Create or update the contact `email` with `data`.
    async fn add_data_contact(&self, email: &str, data: &ContactData) -> Result<(), ContactError>;
}
