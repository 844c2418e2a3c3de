use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entitlements::config::Config;
use entitlements::guest::GuestAction;
use entitlements::identity::{IdentityProvider, LocalIdentity, Principal};
use entitlements::state::Entitlements;
use entitlements::store::FileStore;

/// Diagnostic probe: wires the full service from the environment, runs one
/// refresh cycle against the configured usage API, and prints the
/// resulting decisions.
#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting entitlements probe v{}", env!("CARGO_PKG_VERSION"));
    info!("Usage API: {}", config.api_base_url);

    let identity: Arc<LocalIdentity> = match &config.bearer_token {
        Some(token) => Arc::new(LocalIdentity::signed_in(
            Principal {
                user_id: "probe".to_string(),
                email: None,
            },
            token.clone(),
        )),
        None => Arc::new(LocalIdentity::guest()),
    };
    let is_authenticated = identity.current_principal().is_some();
    info!(
        "Identity: {}",
        if is_authenticated { "authenticated" } else { "guest" }
    );

    let store = Arc::new(FileStore::open(&config.storage_dir)?);
    let service = Arc::new(Entitlements::new(&config, identity, store));
    service.spawn_identity_listener();

    service.client.refresh().await;
    if let Err(err) = service.trial.fetch_trial_status().await {
        warn!("Trial status unavailable: {err}");
    }

    if let Some(error) = service.client.last_error() {
        warn!("Usage stats unavailable: {error}");
    }

    let limits = service.client.usage_limits();
    info!("Trial state: {:?}", service.trial.state(limits.as_ref()));
    if let Some(status) = service.trial.trial_status() {
        info!("Trial days remaining: {}", status.days_remaining());
    }

    for feature in ["exports", "ai_generations", "resumes"] {
        let decision = service.client.check_feature(feature);
        info!("{feature}: {}", serde_json::to_string(&decision)?);
    }

    for action in GuestAction::ALL {
        info!(
            "Guest {}: {}/{} used",
            action.key_name(),
            service.guest.used(action),
            action.limit()
        );
    }

    Ok(())
}
