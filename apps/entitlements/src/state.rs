//! The wired entitlement service.
//!
//! One HTTP client is shared by the usage and trial fetchers, one guest
//! store by the session id and the action limiter. Dependencies are
//! injected at construction; nothing here reaches for ambient singletons.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::EntitlementClient;
use crate::config::Config;
use crate::guest::GuestActionLimiter;
use crate::identity::IdentityProvider;
use crate::store::{ensure_guest_session_id, GuestStore};
use crate::trial::TrialManager;

pub struct Entitlements {
    pub client: Arc<EntitlementClient>,
    pub trial: Arc<TrialManager>,
    pub guest: GuestActionLimiter,
    identity: Arc<dyn IdentityProvider>,
}

impl Entitlements {
    pub fn new(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn GuestStore>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        // Mint the guest session id up front so the first guest fetch can
        // already identify itself. An unavailable store only degrades the
        // guest paths, which fail open anyway.
        if let Err(err) = ensure_guest_session_id(store.as_ref()) {
            warn!("Guest session id unavailable: {err}");
        }

        let client = Arc::new(EntitlementClient::new(
            http.clone(),
            config.api_base_url.clone(),
            identity.clone(),
            store.clone(),
            config.premium_mode_enabled,
        ));
        let trial = Arc::new(TrialManager::new(
            http,
            config.api_base_url.clone(),
            identity.clone(),
            config.premium_mode_enabled,
        ));
        let guest = GuestActionLimiter::new(store);

        Self {
            client,
            trial,
            guest,
            identity,
        }
    }

    /// Subscribes to identity transitions. A genuine principal change
    /// (not a re-notification of the same one) refreshes both snapshot
    /// caches and the trial status; a guest signing in additionally clears
    /// the guest action counters, so the new account never inherits them.
    pub fn spawn_identity_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.identity.subscribe();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut previous = rx.borrow_and_update().clone();
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                if current == previous {
                    continue;
                }
                if previous.is_none() && current.is_some() {
                    service.guest.reset_counters();
                }
                info!(
                    "Identity changed ({} -> {}), refreshing entitlements",
                    previous.as_ref().map_or("guest", |p| p.user_id.as_str()),
                    current.as_ref().map_or("guest", |p| p.user_id.as_str()),
                );
                service.client.refresh().await;
                if let Err(err) = service.trial.fetch_trial_status().await {
                    warn!("Trial status refresh failed: {err}");
                }
                previous = current;
            }
        })
    }
}
