//! Trial lifecycle: eligibility, activation, and derived state.
//!
//! Trials are offered to authenticated principals only, and only while
//! quota enforcement is enabled. Guards here no-op or reject with a
//! readable reason instead of erroring, so UI callers can invoke them
//! unconditionally.

use std::sync::{Arc, RwLock};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::EntitlementError;
use crate::identity::IdentityProvider;
use crate::models::trial::TrialStatus;
use crate::models::usage::UsageLimits;

/// Derived lifecycle state, for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    NoTrial,
    Eligible,
    Active,
    Expired,
}

/// Result of a start-trial attempt. `success: false` carries the reason,
/// whether it came from a local guard or from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTrialOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartTrialOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
        }
    }
}

/// Derives the lifecycle state from the latest eligibility and status
/// snapshots. Status wins over eligibility: an active or consumed trial is
/// reported as such even if the limits snapshot is stale or missing.
pub fn derive_trial_state(
    limits: Option<&UsageLimits>,
    status: Option<&TrialStatus>,
) -> TrialState {
    if let Some(status) = status {
        if status.is_active {
            return TrialState::Active;
        }
        if status.has_trial {
            return TrialState::Expired;
        }
    }
    if limits.is_some_and(|l| l.trial_eligible) {
        return TrialState::Eligible;
    }
    TrialState::NoTrial
}

pub struct TrialManager {
    http: Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
    premium_mode_enabled: bool,
    status: RwLock<Option<TrialStatus>>,
}

impl TrialManager {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
        premium_mode_enabled: bool,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
            premium_mode_enabled,
            status: RwLock::new(None),
        }
    }

    /// Latest successfully fetched trial status, if any.
    pub fn trial_status(&self) -> Option<TrialStatus> {
        self.status.read().expect("trial status lock poisoned").clone()
    }

    /// Lifecycle state derived from the cached status plus the given
    /// limits snapshot.
    pub fn state(&self, limits: Option<&UsageLimits>) -> TrialState {
        derive_trial_state(limits, self.trial_status().as_ref())
    }

    /// Fetches `/api/usage/trial/status` for the current principal.
    /// No-ops for guests and while quota enforcement is disabled. A failed
    /// fetch keeps the previous status; the error is non-fatal.
    pub async fn fetch_trial_status(&self) -> Result<(), EntitlementError> {
        if !self.premium_mode_enabled {
            return Ok(());
        }
        let Some(token) = self.identity.bearer_token().await else {
            return Ok(());
        };

        let response = self
            .http
            .get(format!("{}/api/usage/trial/status", self.base_url))
            .bearer_auth(token)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("Trial status fetch failed: {err}");
                return Err(err.into());
            }
        };

        let status_code = response.status();
        if !status_code.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Trial status fetch returned {status_code}: {message}");
            return Err(EntitlementError::Api {
                status: status_code.as_u16(),
                message,
            });
        }

        let status: TrialStatus = response.json().await?;
        debug!(
            "Trial status: active={}, days_remaining={}",
            status.is_active,
            status.days_remaining()
        );
        *self.status.write().expect("trial status lock poisoned") = Some(status);
        Ok(())
    }

    /// Starts a trial for the current principal.
    ///
    /// Requires authentication and enabled enforcement; otherwise returns a
    /// rejection with a readable reason and issues no request. On server
    /// success the cached status is refreshed before this resolves, so the
    /// caller observes the post-trial view. Not idempotent at the transport
    /// layer: the server may reject a second start while one is active, and
    /// that rejection is surfaced verbatim.
    pub async fn start_trial(&self) -> StartTrialOutcome {
        if !self.premium_mode_enabled {
            return StartTrialOutcome::rejected("Trials are not available right now");
        }
        let Some(token) = self.identity.bearer_token().await else {
            return StartTrialOutcome::rejected("Please sign in to start a trial");
        };

        let response = self
            .http
            .post(format!("{}/api/usage/trial/start", self.base_url))
            .bearer_auth(token)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("Trial start request failed: {err}");
                return StartTrialOutcome::rejected("Could not reach the server. Please try again.");
            }
        };

        let status_code = response.status();
        if !status_code.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Trial start returned {status_code}: {message}");
            return StartTrialOutcome::rejected("Could not start your trial. Please try again.");
        }

        let outcome: StartTrialOutcome = match response.json().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Trial start response unreadable: {err}");
                return StartTrialOutcome::rejected("Could not start your trial. Please try again.");
            }
        };

        if outcome.success {
            // Refresh before resolving so the caller never observes the
            // pre-trial status after a successful start.
            if let Err(err) = self.fetch_trial_status().await {
                warn!("Post-start trial status refresh failed: {err}");
            }
        }
        outcome
    }

    /// Side-effect-free eligibility probe. Returns `false` for guests, with
    /// enforcement disabled, and on any transport or decode failure, so
    /// callers can use it directly in rendering logic.
    pub async fn check_trial_eligibility(&self) -> bool {
        if !self.premium_mode_enabled {
            return false;
        }
        let Some(token) = self.identity.bearer_token().await else {
            return false;
        };

        let response = self
            .http
            .get(format!("{}/api/usage/limits", self.base_url))
            .bearer_auth(token)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => response
                .json::<UsageLimits>()
                .await
                .map(|limits| limits.trial_eligible)
                .unwrap_or(false),
            Ok(response) => {
                debug!("Eligibility probe returned {}", response.status());
                false
            }
            Err(err) => {
                debug!("Eligibility probe failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use tokio::net::TcpListener;

    use crate::identity::{LocalIdentity, Principal};
    use crate::models::usage::FREE_TIER;

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn signed_in_identity() -> Arc<LocalIdentity> {
        Arc::new(LocalIdentity::signed_in(
            Principal {
                user_id: "u1".to_string(),
                email: None,
            },
            "tok-1",
        ))
    }

    fn limits(trial_eligible: bool) -> UsageLimits {
        UsageLimits {
            plan_tier: FREE_TIER.to_string(),
            is_premium_mode: true,
            limits: Default::default(),
            trial_eligible,
            trial_active: false,
        }
    }

    fn status(has_trial: bool, is_active: bool) -> TrialStatus {
        TrialStatus {
            has_trial,
            is_active,
            expires_at: Some(Utc::now() + Duration::days(7)),
            started_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_state_no_trial_without_data() {
        assert_eq!(derive_trial_state(None, None), TrialState::NoTrial);
    }

    #[test]
    fn test_state_eligible_from_limits() {
        assert_eq!(
            derive_trial_state(Some(&limits(true)), None),
            TrialState::Eligible
        );
        assert_eq!(
            derive_trial_state(Some(&limits(false)), None),
            TrialState::NoTrial
        );
    }

    #[test]
    fn test_state_active_wins_over_eligibility() {
        assert_eq!(
            derive_trial_state(Some(&limits(true)), Some(&status(true, true))),
            TrialState::Active
        );
    }

    #[test]
    fn test_state_expired_when_trial_consumed() {
        assert_eq!(
            derive_trial_state(None, Some(&status(true, false))),
            TrialState::Expired
        );
    }

    #[test]
    fn test_state_falls_back_to_eligibility_when_never_trialed() {
        assert_eq!(
            derive_trial_state(Some(&limits(true)), Some(&status(false, false))),
            TrialState::Eligible
        );
    }

    #[tokio::test]
    async fn test_start_trial_rejects_guests_without_network() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = hits.clone();
        let router = Router::new().route(
            "/api/usage/trial/start",
            post(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"success": true}))
                }
            }),
        );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            Arc::new(LocalIdentity::guest()),
            true,
        );

        let outcome = manager.start_trial().await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Please sign in to start a trial")
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_trial_success_refreshes_status_first() {
        let router = Router::new()
            .route(
                "/api/usage/trial/start",
                post(|| async { Json(serde_json::json!({"success": true})) }),
            )
            .route(
                "/api/usage/trial/status",
                get(|| async {
                    Json(serde_json::json!({
                        "has_trial": true,
                        "is_active": true,
                        "expires_at": (Utc::now() + Duration::days(7)).to_rfc3339(),
                        "started_at": Utc::now().to_rfc3339()
                    }))
                }),
            );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            signed_in_identity(),
            true,
        );

        let outcome = manager.start_trial().await;

        assert!(outcome.success);
        let status = manager.trial_status().unwrap();
        assert!(status.is_active);
        assert_eq!(manager.state(None), TrialState::Active);
        assert_eq!(status.days_remaining(), 7);
    }

    #[tokio::test]
    async fn test_start_trial_server_rejection_surfaced_verbatim() {
        let router = Router::new().route(
            "/api/usage/trial/start",
            post(|| async {
                Json(serde_json::json!({
                    "success": false,
                    "message": "Trial already used"
                }))
            }),
        );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            signed_in_identity(),
            true,
        );

        let outcome = manager.start_trial().await;

        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Trial already used"));
        assert!(manager.trial_status().is_none());
    }

    #[tokio::test]
    async fn test_fetch_trial_status_noop_for_guests() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = hits.clone();
        let router = Router::new().route(
            "/api/usage/trial/status",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"has_trial": false, "is_active": false}))
                }
            }),
        );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            Arc::new(LocalIdentity::guest()),
            true,
        );

        manager.fetch_trial_status().await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(manager.trial_status().is_none());
    }

    #[tokio::test]
    async fn test_failed_status_fetch_keeps_previous() {
        let fail = Arc::new(AtomicUsize::new(0));
        let fail_handler = fail.clone();
        let router = Router::new().route(
            "/api/usage/trial/status",
            get(move || {
                let fail = fail_handler.clone();
                async move {
                    if fail.load(Ordering::SeqCst) == 0 {
                        Ok(Json(serde_json::json!({
                            "has_trial": true,
                            "is_active": true,
                            "expires_at": (Utc::now() + Duration::days(3)).to_rfc3339(),
                            "started_at": null
                        })))
                    } else {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }
            }),
        );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            signed_in_identity(),
            true,
        );

        manager.fetch_trial_status().await.unwrap();
        assert!(manager.fetch_trial_status().await.is_ok());

        fail.store(1, Ordering::SeqCst);
        assert!(manager.fetch_trial_status().await.is_err());
        assert!(manager.trial_status().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_eligibility_probe_never_errors() {
        let manager = TrialManager::new(
            Client::new(),
            "http://127.0.0.1:1".to_string(),
            signed_in_identity(),
            true,
        );
        assert!(!manager.check_trial_eligibility().await);

        let guest = TrialManager::new(
            Client::new(),
            "http://127.0.0.1:1".to_string(),
            Arc::new(LocalIdentity::guest()),
            true,
        );
        assert!(!guest.check_trial_eligibility().await);
    }

    #[tokio::test]
    async fn test_eligibility_probe_reads_limits() {
        let router = Router::new().route(
            "/api/usage/limits",
            get(|| async {
                Json(serde_json::json!({
                    "plan_tier": "free",
                    "is_premium_mode": true,
                    "limits": {},
                    "trial_eligible": true,
                    "trial_active": false
                }))
            }),
        );
        let addr = serve(router).await;
        let manager = TrialManager::new(
            Client::new(),
            format!("http://{addr}"),
            signed_in_identity(),
            true,
        );

        assert!(manager.check_trial_eligibility().await);
    }
}
