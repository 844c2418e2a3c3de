//! Feature gate: decides whether a metered feature may be used right now.
//!
//! Pure evaluation over the cached usage snapshot. No I/O, no mutable
//! state; how the snapshot was obtained is the client's business.

use serde::Serialize;

use crate::models::usage::{UsagePeriod, UsageStats};

/// Outcome of a feature availability check.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureDecision {
    pub allowed: bool,
    pub current_usage: u32,
    /// `None` means no cap applies.
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<UsagePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeatureDecision {
    fn ungated() -> Self {
        Self {
            allowed: true,
            current_usage: 0,
            limit: None,
            period: None,
            message: None,
        }
    }

    fn pending() -> Self {
        Self {
            allowed: false,
            current_usage: 0,
            limit: None,
            period: None,
            message: Some("Checking your usage limits...".to_string()),
        }
    }
}

/// Decides whether `feature` may be used, given the latest usage snapshot.
///
/// `stats` of `None` means no snapshot has been fetched yet. That denies
/// rather than grants: a slow first load must not flash an action the
/// server is about to refuse. A feature the snapshot does not track at all
/// is the opposite case and passes ungated.
pub fn check_feature_availability(
    feature: &str,
    stats: Option<&UsageStats>,
    enforcement_enabled: bool,
) -> FeatureDecision {
    if !enforcement_enabled {
        return FeatureDecision::ungated();
    }

    let Some(stats) = stats else {
        return FeatureDecision::pending();
    };

    if !stats.is_premium_mode {
        return FeatureDecision::ungated();
    }

    let Some(entry) = stats.feature(feature) else {
        return FeatureDecision::ungated();
    };

    let limit = match entry.limit {
        Some(limit) if !entry.unlimited => limit,
        _ => {
            return FeatureDecision {
                allowed: true,
                current_usage: entry.current_usage,
                limit: None,
                period: Some(entry.period),
                message: None,
            };
        }
    };

    let allowed = entry.current_usage < limit;
    let message = if allowed {
        let remaining = limit - entry.current_usage;
        format!("{remaining} {}", entry.period.phrase())
    } else {
        format!(
            "You've reached your {} limit. Upgrade to continue.",
            entry.period.limit_label()
        )
    };

    FeatureDecision {
        allowed,
        current_usage: entry.current_usage,
        limit: Some(limit),
        period: Some(entry.period),
        message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use crate::models::usage::{FeatureUsage, FREE_TIER};

    use super::*;

    fn feature(current: u32, limit: Option<u32>, unlimited: bool) -> FeatureUsage {
        FeatureUsage {
            current_usage: current,
            limit,
            period: UsagePeriod::Monthly,
            unlimited,
        }
    }

    fn stats(entries: Vec<(&str, FeatureUsage)>) -> UsageStats {
        UsageStats {
            plan_tier: FREE_TIER.to_string(),
            is_premium_mode: true,
            features: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            exports: None,
            trial_active: None,
        }
    }

    #[test]
    fn test_enforcement_disabled_allows_everything() {
        let decision = check_feature_availability("exports", None, false);
        assert!(decision.allowed);
        assert!(decision.limit.is_none());
    }

    #[test]
    fn test_no_snapshot_denies_every_feature() {
        for key in ["exports", "ai_generations", "anything"] {
            let decision = check_feature_availability(key, None, true);
            assert!(!decision.allowed, "{key} should be denied before first fetch");
            assert!(decision.message.is_some());
        }
    }

    #[test]
    fn test_premium_mode_off_in_snapshot_allows() {
        let mut snapshot = stats(vec![("exports", feature(5, Some(1), false))]);
        snapshot.is_premium_mode = false;
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(decision.allowed);
    }

    #[test]
    fn test_untracked_feature_is_ungated() {
        let snapshot = stats(vec![]);
        let decision = check_feature_availability("cover_letters", Some(&snapshot), true);
        assert!(decision.allowed);
        assert!(decision.limit.is_none());
    }

    #[test]
    fn test_unlimited_flag_allows_regardless_of_usage() {
        let snapshot = stats(vec![("exports", feature(1_000_000, None, true))]);
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(decision.allowed);
        assert!(decision.limit.is_none());
    }

    #[test]
    fn test_null_limit_without_flag_still_unlimited() {
        let snapshot = stats(vec![("exports", feature(42, None, false))]);
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(decision.allowed);
        assert!(decision.limit.is_none());
        assert_eq!(decision.current_usage, 42);
    }

    #[test]
    fn test_under_limit_allows_with_remaining_message() {
        let snapshot = stats(vec![("exports", feature(1, Some(3), false))]);
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(decision.allowed);
        assert_eq!(decision.current_usage, 1);
        assert_eq!(decision.limit, Some(3));
        assert_eq!(decision.message.as_deref(), Some("2 this month"));
    }

    #[test]
    fn test_at_limit_denies_with_upgrade_prompt() {
        let snapshot = stats(vec![("exports", feature(3, Some(3), false))]);
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(!decision.allowed);
        assert_eq!(decision.current_usage, 3);
        assert_eq!(decision.limit, Some(3));
        assert_eq!(decision.period, Some(UsagePeriod::Monthly));
        assert!(decision.message.unwrap().contains("Upgrade"));
    }

    #[test]
    fn test_allowed_iff_usage_below_limit() {
        for usage in 0..6u32 {
            let snapshot = stats(vec![("exports", feature(usage, Some(3), false))]);
            let decision = check_feature_availability("exports", Some(&snapshot), true);
            assert_eq!(decision.allowed, usage < 3, "usage {usage}");
            if decision.allowed {
                let message = decision.message.unwrap();
                assert!(message.starts_with(&(3 - usage).to_string()), "{message}");
            }
        }
    }

    #[test]
    fn test_exports_fallback_slot_is_gated() {
        let mut snapshot = stats(vec![]);
        snapshot.exports = Some(feature(3, Some(3), false));
        let decision = check_feature_availability("exports", Some(&snapshot), true);
        assert!(!decision.allowed);
    }

    #[test]
    fn test_daily_and_session_messages() {
        for (period, expected) in [
            (UsagePeriod::Daily, "1 today"),
            (UsagePeriod::Session, "1 this session"),
        ] {
            let mut entry = feature(0, Some(1), false);
            entry.period = period;
            let snapshot = stats(vec![("exports", entry)]);
            let decision = check_feature_availability("exports", Some(&snapshot), true);
            assert_eq!(decision.message.as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_decision_serializes_without_empty_fields() {
        let decision = check_feature_availability("exports", None, false);
        let value = serde_json::to_value(&decision).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("message"));
        assert_eq!(object.get("allowed"), Some(&serde_json::Value::Bool(true)));
    }
}
