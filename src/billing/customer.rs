//! Customer creation for newly registered users.

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::context::Services;
use crate::contacts::{ContactData, user_to_person};
use crate::error::{BillingError, Result};
use crate::segments::{Plan, segment_for_user};
use crate::store::models::{FREE_PRODUCT_ID, StripeInfo, User};

/// Billing record of a payment-provider customer.
pub async fn get_stripe_customer(
    services: &Services,
    customer_id: &str,
) -> Result<Option<StripeInfo>> {
    Ok(services.db.get_stripe_info(customer_id).await?)
}

/// Register `user` with the payment provider and start their trial.
///
/// Only the provider call can fail the operation. The billing record, the
/// user link and the contact update are attempted in order and their
/// failures are logged.
pub async fn create_stripe_customer(services: &Services, user: &User) -> Result<StripeInfo> {
    let payments = services
        .payments
        .as_ref()
        .ok_or(BillingError::NotConfigured)?;
    let db = services.db.as_ref();

    let customer = payments
        .create_customer(&user.email, &user.id, &user.display_name())
        .await?;

    let info = StripeInfo::new_trial(
        customer.id.clone(),
        Utc::now() + Duration::days(services.trial_days),
    );
    if let Err(e) = db.insert_stripe_info(&info).await {
        error!(user_id = %user.id, customer_id = %customer.id, error = %e, "Failed to create billing record");
    }
    if let Err(e) = db.set_user_customer_id(&user.id, &customer.id).await {
        error!(user_id = %user.id, customer_id = %customer.id, error = %e, "Failed to link customer to user");
    }

    let plan = match db.get_plan_by_stripe_id(FREE_PRODUCT_ID).await {
        Ok(plan) => plan.as_ref().map(Plan::from),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Free plan lookup failed");
            None
        }
    };
    let segment = segment_for_user(
        db,
        &user.id,
        info.price_id.as_deref().unwrap_or_default(),
        plan,
    )
    .await;

    match &services.contacts {
        Some(contacts) => {
            let data = ContactData {
                person: user_to_person(user, &info),
                segment,
            };
            if let Err(e) = contacts.add_data_contact(&user.email, &data).await {
                error!(user_id = %user.id, error = %e, "Failed to update contact");
            }
        }
        None => debug!(user_id = %user.id, "No contact service configured"),
    }

    info!(user_id = %user.id, customer_id = %customer.id, "Customer created");
    Ok(info)
}
