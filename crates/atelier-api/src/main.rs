//! # Atelier
//!
//! Storefront backend for the atelier luxury leather goods app.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export DATABASE_URL=postgres://localhost/atelier
//! export JWT_SECRET=... JWT_REFRESH_SECRET=...
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//!
//! # Run the server
//! atelier
//! ```

use atelier_api::auth::hash_password;
use atelier_api::config::{AppConfig, LogFormat};
use atelier_api::push::{FcmNotifier, LoggingNotifier};
use atelier_api::{routes, AppState};
use atelier_core::{BoxedPushNotifier, SeedData, SharedStore, Store};
use atelier_pay::configured_strategies;
use atelier_store::{apply_seed, MemoryStore, PgStore};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());
    let config = AppConfig::from_env()?;

    print_banner();
    info!("Environment: {}", config.environment);

    match config.database_url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, config.database_max_connections).await?;
            store.migrate().await?;
            serve(config, Arc::new(store)).await
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            serve(config, Arc::new(MemoryStore::new())).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }
}

async fn serve<S: Store + 'static>(config: AppConfig, store: Arc<S>) -> anyhow::Result<()> {
    seed(&config, store.as_ref()).await?;

    let shared: SharedStore = store.clone();
    let notifier: BoxedPushNotifier = match config.fcm.clone() {
        Some(fcm) => Arc::new(FcmNotifier::new(shared, fcm)?),
        None => {
            info!("FCM not configured, push notifications are logged only");
            Arc::new(LoggingNotifier::new(shared))
        }
    };

    let strategies = configured_strategies(config.store_currency);
    let addr = config.socket_addr()?;
    let is_prod = config.is_production();

    let state = AppState::build(config, store, strategies, notifier);
    info!("Storage: {}", state.store.backend());
    info!("Payment providers: {:?}", state.strategies.providers());
    info!("Push delivery: {}", state.notifier.name());

    let app = routes::create_router(state);

    info!("Atelier API starting on http://{}", addr);
    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Stripe webhook: POST http://{}/api/payments/stripe/webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Upsert categories, products and the admin account from `SEED_FILE`
async fn seed(config: &AppConfig, store: &dyn Store) -> anyhow::Result<()> {
    let Some(path) = &config.seed_file else {
        return Ok(());
    };

    let raw = tokio::fs::read_to_string(path).await?;
    let data = SeedData::from_toml(&raw)?;

    let admin_hash = match (&data.admin, &config.admin_password) {
        (Some(_), Some(password)) => Some(hash_password(password.clone(), config.bcrypt_cost).await?),
        (Some(admin), None) => {
            warn!(email = %admin.email, "ADMIN_PASSWORD not set, admin account not seeded");
            None
        }
        _ => None,
    };

    info!(path = %path.display(), "Applying seed data");
    apply_seed(store, data, admin_hash).await?;
    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Atelier
  ━━━━━━━━━━━━━━━━━━━━━━━
  Luxury storefront API
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
