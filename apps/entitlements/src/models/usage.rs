use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Feature key for resume exports. The only key with a legacy fallback slot
/// on [`UsageStats`].
pub const EXPORTS_FEATURE: &str = "exports";

/// Plan tier assigned to principals the server has never seen.
/// All other tier values are opaque server-issued strings.
pub const FREE_TIER: &str = "free";

/// Reset window for a metered feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Session,
    Daily,
    Monthly,
}

impl UsagePeriod {
    /// Suffix for "N remaining" messages, e.g. "2 this month".
    pub fn phrase(&self) -> &'static str {
        match self {
            UsagePeriod::Session => "this session",
            UsagePeriod::Daily => "today",
            UsagePeriod::Monthly => "this month",
        }
    }

    /// Adjective for "you've reached your X limit" messages.
    pub fn limit_label(&self) -> &'static str {
        match self {
            UsagePeriod::Session => "session",
            UsagePeriod::Daily => "daily",
            UsagePeriod::Monthly => "monthly",
        }
    }
}

/// Consumption record for one metered feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub current_usage: u32,
    /// `None` means no cap.
    pub limit: Option<u32>,
    pub period: UsagePeriod,
    #[serde(default)]
    pub unlimited: bool,
}

impl FeatureUsage {
    /// A missing limit counts as unlimited even when the server forgot to
    /// set the flag.
    pub fn is_unlimited(&self) -> bool {
        self.unlimited || self.limit.is_none()
    }
}

/// Snapshot of a principal's consumption, fetched from `/api/usage/stats`.
///
/// Owned by the entitlement client and replaced wholesale on every
/// successful fetch. Never merged field by field with a stale copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub plan_tier: String,
    /// Whether quota enforcement is active at all for this principal.
    pub is_premium_mode: bool,
    #[serde(default)]
    pub features: HashMap<String, FeatureUsage>,
    /// Legacy slot consulted only when `features["exports"]` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<FeatureUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_active: Option<bool>,
}

impl UsageStats {
    /// Resolves the usage entry for a feature key. Exact match wins; the
    /// top-level `exports` slot fills in for a missing `features["exports"]`
    /// entry during the server-side migration away from it.
    pub fn feature(&self, key: &str) -> Option<&FeatureUsage> {
        if let Some(entry) = self.features.get(key) {
            return Some(entry);
        }
        if key == EXPORTS_FEATURE {
            return self.exports.as_ref();
        }
        None
    }
}

/// Eligibility companion to [`UsageStats`], fetched from `/api/usage/limits`.
/// Advisory data: a failed fetch is logged, not surfaced as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLimits {
    pub plan_tier: String,
    pub is_premium_mode: bool,
    /// Per-feature limit descriptors. Opaque to the client, rendered as-is.
    #[serde(default)]
    pub limits: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub trial_eligible: bool,
    #[serde(default)]
    pub trial_active: bool,
}
