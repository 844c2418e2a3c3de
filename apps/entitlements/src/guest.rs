//! Per-action caps for anonymous visitors.
//!
//! Entirely client-local: no network involvement before the verdict. The
//! caps are a nudge toward sign-up, not a security boundary; the server
//! re-enforces real limits on every action that reaches it. Counters are
//! not atomic across processes sharing the store file, which can let a
//! guest exceed a cap by one. Acceptable for a soft limit.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::{GuestStore, GUEST_ACTION_PREFIX};

/// Actions a guest may attempt a limited number of times before being
/// asked to sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestAction {
    ExportResume,
    SaveResume,
    SaveJobDescription,
}

impl GuestAction {
    pub const ALL: [GuestAction; 3] = [
        GuestAction::ExportResume,
        GuestAction::SaveResume,
        GuestAction::SaveJobDescription,
    ];

    pub fn key_name(&self) -> &'static str {
        match self {
            GuestAction::ExportResume => "exportResume",
            GuestAction::SaveResume => "saveResume",
            GuestAction::SaveJobDescription => "saveJobDescription",
        }
    }

    fn storage_key(&self) -> String {
        format!("{GUEST_ACTION_PREFIX}{}", self.key_name())
    }

    /// Free attempts before the sign-in prompt. New actions default to 1
    /// unless given their own cap here.
    pub fn limit(&self) -> u32 {
        match self {
            GuestAction::ExportResume | GuestAction::SaveResume | GuestAction::SaveJobDescription => {
                1
            }
        }
    }
}

pub struct GuestActionLimiter {
    store: Arc<dyn GuestStore>,
}

impl GuestActionLimiter {
    pub fn new(store: Arc<dyn GuestStore>) -> Self {
        Self { store }
    }

    /// Returns `true` when the caller should block the action and prompt
    /// sign-in.
    ///
    /// This is a check, not consume-then-check: a blocked call never
    /// advances the counter; the counter moves only on the proceed path.
    /// An unavailable store lets the action through, since the server
    /// validates it anyway.
    pub fn should_prompt_authentication(&self, action: GuestAction, is_authenticated: bool) -> bool {
        if is_authenticated {
            return false;
        }

        let key = action.storage_key();
        let count = match self.store.get(&key) {
            Ok(raw) => raw.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0),
            Err(err) => {
                warn!("Guest store unavailable, allowing {}: {err}", action.key_name());
                return false;
            }
        };

        if count >= action.limit() {
            return true;
        }

        if let Err(err) = self.store.set(&key, &(count + 1).to_string()) {
            warn!("Could not record guest {}: {err}", action.key_name());
            return false;
        }
        debug!(
            "Guest action {} used {}/{}",
            action.key_name(),
            count + 1,
            action.limit()
        );
        false
    }

    /// How many attempts of `action` have been recorded. Read-only.
    pub fn used(&self, action: GuestAction) -> u32 {
        self.store
            .get(&action.storage_key())
            .ok()
            .flatten()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    /// Clears every guest action counter. Invoked when a guest signs in so
    /// an authenticated user never inherits stale guest caps. The session
    /// id and any other keys are left alone.
    pub fn reset_counters(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!("Could not reset guest counters: {err}");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(GUEST_ACTION_PREFIX)) {
            if let Err(err) = self.store.remove(key) {
                warn!("Could not clear {key}: {err}");
            }
        }
    }
}
