use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECS_PER_DAY: i64 = 86_400;

/// Trial record for an authenticated principal, fetched from
/// `/api/usage/trial/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialStatus {
    pub has_trial: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl TrialStatus {
    /// Whole days until expiry, rounded up.
    /// Zero when the trial is inactive, already expired, or has no expiry.
    pub fn days_remaining(&self) -> i64 {
        self.days_remaining_at(Utc::now())
    }

    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_active {
            return 0;
        }
        let Some(expires_at) = self.expires_at else {
            return 0;
        };
        let secs = (expires_at - now).num_seconds();
        if secs <= 0 {
            return 0;
        }
        (secs + SECS_PER_DAY - 1) / SECS_PER_DAY
    }
}
