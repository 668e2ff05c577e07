use std::sync::Arc;

use anyhow::{Context as _, bail};

use capgo_backend::analytics::ClickHouseClient;
use capgo_backend::billing::{StripeClient, create_stripe_customer};
use capgo_backend::config::AppConfig;
use capgo_backend::contacts::PlunkClient;
use capgo_backend::context::Services;
use capgo_backend::provisioning::{DEFAULT_ORG_NAME, create_api_keys, create_default_org};
use capgo_backend::segments::{Plan, segment_for_user};
use capgo_backend::store::{Database, LibSqlBackend};

const USAGE: &str = "usage: capgo-backend <migrate | segment <user_id> | onboard <user_id>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = AppConfig::from_env()?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .with_context(|| {
                format!("failed to open database at {}", config.database_path.display())
            })?,
    );

    let mut services = Services::new(Arc::clone(&db)).with_trial_days(config.trial_days);
    if let Some(analytics) = &config.analytics {
        services = services.with_analytics(Arc::new(ClickHouseClient::from_config(analytics)));
    }
    if let Some(stripe) = &config.stripe {
        services = services.with_payments(Arc::new(StripeClient::from_config(stripe)));
    }
    if let Some(plunk) = &config.plunk {
        services = services.with_contacts(Arc::new(PlunkClient::from_config(plunk)));
    }

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["migrate"] => {
            // Migrations already ran when the database was opened.
            eprintln!("Database ready at {}", config.database_path.display());
        }
        ["segment", user_id] => {
            let segment = segment_command(db.as_ref(), user_id).await?;
            println!("{}", serde_json::to_string_pretty(&segment)?);
        }
        ["onboard", user_id] => onboard_command(&services, user_id).await?,
        _ => bail!(USAGE),
    }
    Ok(())
}

/// Classify a user from their stored billing record.
async fn segment_command(
    db: &dyn Database,
    user_id: &str,
) -> anyhow::Result<capgo_backend::segments::Segment> {
    let user = db
        .get_user(user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))?;

    let info = match user.customer_id.as_deref() {
        Some(customer_id) => db.get_stripe_info(customer_id).await?,
        None => None,
    };
    let plan = match &info {
        Some(info) => db
            .get_plan_by_stripe_id(&info.product_id)
            .await?
            .as_ref()
            .map(Plan::from),
        None => None,
    };
    let price_id = info
        .as_ref()
        .and_then(|i| i.price_id.clone())
        .unwrap_or_default();

    Ok(segment_for_user(db, user_id, &price_id, plan).await)
}

/// Provision keys, organization and billing for a user.
async fn onboard_command(services: &Services, user_id: &str) -> anyhow::Result<()> {
    let user = services
        .db
        .get_user(user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))?;

    create_api_keys(services, user_id).await?;
    create_default_org(services, user_id, DEFAULT_ORG_NAME).await?;

    if user.customer_id.is_some() {
        eprintln!("User {user_id} already has a billing customer");
    } else if services.payments.is_some() {
        let info = create_stripe_customer(services, &user).await?;
        eprintln!(
            "Created customer {} (trial until {})",
            info.customer_id,
            info.trial_at.format("%Y-%m-%d")
        );
    } else {
        eprintln!("STRIPE_SECRET_KEY not set, skipping billing setup");
    }

    eprintln!("User {user_id} onboarded");
    Ok(())
}
