//! Severity transition rules.
//!
//! The only state is the last persisted tier. A run notifies when the
//! aggregated tier strictly exceeds it; every completed run records the new
//! tier, including drops, so a later re-rise alerts again.

use crate::model::{AlertState, SeverityTier};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What to do when an owner has no persisted state yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColdStart {
    /// Treat the missing state as NONE. Rain on the first run alerts.
    #[default]
    AlertImmediately,
    /// Record the first observation silently.
    EstablishBaseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    UpwardTransition,
    Unchanged,
    Downward,
    Baseline,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::UpwardTransition => "upward_transition",
            DecisionReason::Unchanged => "unchanged",
            DecisionReason::Downward => "downward",
            DecisionReason::Baseline => "baseline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub previous: SeverityTier,
    pub current: SeverityTier,
    pub notify: bool,
    pub reason: DecisionReason,
    /// The record to write if this run wins the compare-and-set.
    pub next_state: AlertState,
}

/// Decides whether `current` is an upward transition from the persisted state.
pub fn decide(
    persisted: Option<&AlertState>,
    current: SeverityTier,
    now: DateTime<Utc>,
    cold_start: ColdStart,
) -> Decision {
    let previous = persisted.map(|s| s.last_severity).unwrap_or_default();
    let last_alert_sent_at = persisted.and_then(|s| s.last_alert_sent_at);

    let reason = match persisted {
        None if cold_start == ColdStart::EstablishBaseline => DecisionReason::Baseline,
        _ if current > previous => DecisionReason::UpwardTransition,
        _ if current == previous => DecisionReason::Unchanged,
        _ => DecisionReason::Downward,
    };
    let notify = reason == DecisionReason::UpwardTransition;

    Decision {
        previous,
        current,
        notify,
        reason,
        next_state: AlertState {
            last_severity: current,
            last_observed_at: now,
            last_alert_sent_at: if notify { Some(now) } else { last_alert_sent_at },
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use SeverityTier::{Heavy, Light, Moderate};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 7, minute, 0).unwrap()
    }

    fn state(tier: SeverityTier, alerted: Option<DateTime<Utc>>) -> AlertState {
        AlertState {
            last_severity: tier,
            last_observed_at: at(0),
            last_alert_sent_at: alerted,
        }
    }

    #[test]
    fn test_strict_increase_notifies_and_stamps_alert_time() {
        let prior = state(Light, None);
        let d = decide(Some(&prior), Heavy, at(5), ColdStart::AlertImmediately);
        assert!(d.notify);
        assert_eq!(d.reason, DecisionReason::UpwardTransition);
        assert_eq!((d.previous, d.current), (Light, Heavy));
        assert_eq!(d.next_state.last_alert_sent_at, Some(at(5)));
        assert_eq!(d.next_state.last_observed_at, at(5));
    }

    #[test]
    fn test_same_tier_only_refreshes_observation_time() {
        let prior = state(Light, Some(at(0)));
        let d = decide(Some(&prior), Light, at(5), ColdStart::AlertImmediately);
        assert!(!d.notify);
        assert_eq!(d.reason, DecisionReason::Unchanged);
        assert_eq!(
            d.next_state,
            AlertState {
                last_severity: Light,
                last_observed_at: at(5),
                last_alert_sent_at: Some(at(0)),
            }
        );
    }

    #[test]
    fn test_drop_is_recorded_without_hysteresis() {
        let prior = state(Heavy, Some(at(0)));
        let d = decide(Some(&prior), Light, at(5), ColdStart::AlertImmediately);
        assert!(!d.notify);
        assert_eq!(d.reason, DecisionReason::Downward);
        assert_eq!(d.next_state.last_severity, Light);
        assert_eq!(d.next_state.last_alert_sent_at, Some(at(0)));
    }

    #[test]
    fn test_first_run_with_rain_alerts_by_default() {
        let d = decide(None, Moderate, at(5), ColdStart::AlertImmediately);
        assert!(d.notify);
        assert_eq!(d.previous, SeverityTier::None);
    }

    #[test]
    fn test_first_run_without_rain_initialises_silently() {
        let d = decide(None, SeverityTier::None, at(5), ColdStart::AlertImmediately);
        assert!(!d.notify);
        assert_eq!(d.next_state.last_severity, SeverityTier::None);
        assert_eq!(d.next_state.last_alert_sent_at, None);
    }

    #[test]
    fn test_baseline_policy_suppresses_only_the_very_first_observation() {
        let first = decide(None, Heavy, at(5), ColdStart::EstablishBaseline);
        assert!(!first.notify);
        assert_eq!(first.reason, DecisionReason::Baseline);

        let second = decide(Some(&first.next_state), Heavy, at(10), ColdStart::EstablishBaseline);
        assert!(!second.notify, "same tier after baseline must stay quiet");

        let lower = decide(Some(&second.next_state), Light, at(15), ColdStart::EstablishBaseline);
        let rise = decide(Some(&lower.next_state), Moderate, at(20), ColdStart::EstablishBaseline);
        assert!(rise.notify, "a later rise alerts under either cold-start policy");
    }

    #[test]
    fn test_notification_fires_iff_tier_exceeds_persisted_tier() {
        let quiet = SeverityTier::None;
        let observed = [quiet, Light, Light, Moderate, quiet, Heavy, Heavy, Moderate, Heavy, quiet];
        let mut persisted: Option<AlertState> = None;
        for (i, &tier) in observed.iter().enumerate() {
            let before = persisted.as_ref().map(|s| s.last_severity).unwrap_or_default();
            let d = decide(persisted.as_ref(), tier, at(i as u32), ColdStart::AlertImmediately);
            assert_eq!(d.notify, tier > before, "step {}: {} after {}", i, tier, before);
            persisted = Some(d.next_state);
        }
    }
}
