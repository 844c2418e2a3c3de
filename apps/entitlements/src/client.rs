//! Client for the server-side usage oracle.
//!
//! Owns the cached `UsageStats` and `UsageLimits` snapshots. Each snapshot
//! is replaced wholesale on a successful fetch; readers always see the
//! latest complete snapshot, even while a refresh is in flight. A failed
//! fetch keeps the previous snapshot and records the error instead of
//! surfacing a fault to the caller's UI layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::EntitlementError;
use crate::gate::{check_feature_availability, FeatureDecision};
use crate::identity::IdentityProvider;
use crate::models::usage::{UsageLimits, UsageStats};
use crate::store::{GuestStore, GUEST_SESSION_KEY};

/// One cached snapshot plus its fetch bookkeeping.
///
/// Overlapping fetches are not sequenced; instead every fetch takes a
/// ticket from a monotonic counter and only the completion holding the
/// newest ticket may touch the snapshot. An older response arriving after
/// a newer one is discarded on arrival, so the cache can never move
/// backwards in time.
struct Slot<T> {
    issued: AtomicU64,
    state: RwLock<SlotState<T>>,
}

struct SlotState<T> {
    value: Option<T>,
    loading: bool,
    error: Option<String>,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            state: RwLock::new(SlotState {
                value: None,
                loading: true,
                error: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SlotState<T>> {
        self.state.read().expect("snapshot lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotState<T>> {
        self.state.write().expect("snapshot lock poisoned")
    }

    fn begin(&self) -> u64 {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.write().loading = true;
        ticket
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }

    fn complete(&self, ticket: u64, value: T) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let mut state = self.write();
        state.value = Some(value);
        state.loading = false;
        state.error = None;
        true
    }

    fn fail(&self, ticket: u64, error: Option<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let mut state = self.write();
        state.loading = false;
        if let Some(error) = error {
            state.error = Some(error);
        }
        true
    }

    fn settle_idle(&self) {
        self.write().loading = false;
    }

    fn value(&self) -> Option<T> {
        self.read().value.clone()
    }

    fn loading(&self) -> bool {
        self.read().loading
    }

    fn error(&self) -> Option<String> {
        self.read().error.clone()
    }
}

pub struct EntitlementClient {
    http: Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn GuestStore>,
    premium_mode_enabled: bool,
    stats: Slot<UsageStats>,
    limits: Slot<UsageLimits>,
}

impl EntitlementClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn GuestStore>,
        premium_mode_enabled: bool,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
            store,
            premium_mode_enabled,
            stats: Slot::new(),
            limits: Slot::new(),
        }
    }

    /// Fetches `/api/usage/stats` and replaces the cached snapshot.
    ///
    /// When quota enforcement is globally disabled this completes
    /// immediately: the previous snapshot (if any) stays untouched and the
    /// loading state clears. A non-success response keeps the previous
    /// snapshot, records the error, and does not retry.
    pub async fn fetch_usage_stats(&self) -> Result<(), EntitlementError> {
        if !self.premium_mode_enabled {
            self.stats.settle_idle();
            return Ok(());
        }
        let ticket = self.stats.begin();
        match self.get_json::<UsageStats>("/api/usage/stats").await {
            Ok(snapshot) => {
                if self.stats.complete(ticket, snapshot) {
                    debug!("Usage stats snapshot replaced");
                } else {
                    debug!("Discarded stale usage stats response");
                }
                Ok(())
            }
            Err(err) => {
                warn!("Usage stats fetch failed: {err}");
                self.stats.fail(ticket, Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Fetches `/api/usage/limits`. Limits are advisory eligibility data,
    /// so a failure is logged without setting the blocking error field.
    pub async fn fetch_usage_limits(&self) -> Result<(), EntitlementError> {
        if !self.premium_mode_enabled {
            self.limits.settle_idle();
            return Ok(());
        }
        let ticket = self.limits.begin();
        match self.get_json::<UsageLimits>("/api/usage/limits").await {
            Ok(snapshot) => {
                if !self.limits.complete(ticket, snapshot) {
                    debug!("Discarded stale usage limits response");
                }
                Ok(())
            }
            Err(err) => {
                warn!("Usage limits fetch failed: {err}");
                self.limits.fail(ticket, None);
                Err(err)
            }
        }
    }

    /// Refetches both snapshots. Called after any action expected to
    /// change usage. Failures are already recorded and logged by the
    /// individual fetchers.
    pub async fn refresh(&self) {
        let _ = tokio::join!(self.fetch_usage_stats(), self.fetch_usage_limits());
    }

    /// Latest successfully fetched stats snapshot, if any.
    pub fn usage_stats(&self) -> Option<UsageStats> {
        self.stats.value()
    }

    pub fn usage_limits(&self) -> Option<UsageLimits> {
        self.limits.value()
    }

    /// Whether a stats fetch is pending. Also `true` before the first
    /// fetch resolves, which is what keeps the gate fail-closed on boot.
    pub fn stats_loading(&self) -> bool {
        self.stats.loading()
    }

    /// Error recorded by the most recent failed stats fetch. Cleared by
    /// the next successful one.
    pub fn last_error(&self) -> Option<String> {
        self.stats.error()
    }

    /// Gate decision for `feature` against the cached snapshot.
    pub fn check_feature(&self, feature: &str) -> FeatureDecision {
        check_feature_availability(
            feature,
            self.usage_stats().as_ref(),
            self.premium_mode_enabled,
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EntitlementError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.get(&url);
        match self.identity.bearer_token().await {
            Some(token) => request = request.bearer_auth(token),
            None => {
                // Guests are identified by the locally persisted session id.
                if let Ok(Some(session_id)) = self.store.get(GUEST_SESSION_KEY) {
                    request = request.query(&[("session_id", session_id.as_str())]);
                }
            }
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}
