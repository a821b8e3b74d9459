//! One evaluation run: frames in, at most one state write and one
//! notification out.
//!
//! Ordering within a run:
//!   1. read profile
//!   2. list recent frames and fetch until K are in hand, skipping failed ones
//!   3. classify each frame at the pinned pixel, aggregate
//!   4. read alert state, decide, compare-and-set write
//!   5. notify, only if this run won the write and the tier rose
//!
//! Every failure before step 4 leaves the store untouched. State is
//! persisted before notifying, so delivery is at-most-once.

use crate::alert::transition::{decide, ColdStart};
use crate::analysis::aggregate::aggregate;
use crate::analysis::classify::Classifier;
use crate::geo;
use crate::ingest::radar::FrameSource;
use crate::logging;
use crate::model::{Profile, RunError, SeverityTier};
use crate::notify::{format_alert_message, Notifier};
use crate::store::{KvBackend, PutOutcome, StateStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-deployment knobs for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub owner_id: String,
    /// Recency window for listed frames.
    pub max_age: Duration,
    /// K: how many of the newest frames to fetch and aggregate.
    pub frame_count: usize,
    pub cold_start: ColdStart,
    /// Replaces `Profile.notification_target` when set.
    pub target_override: Option<String>,
}

impl MonitorSettings {
    pub fn new(owner_id: &str) -> Self {
        MonitorSettings {
            owner_id: owner_id.to_string(),
            max_age: Duration::from_secs(30 * 60),
            frame_count: 3,
            cold_start: ColdStart::default(),
            target_override: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// The run completed but some frame was skipped or delivery failed.
    PartialFailure,
    /// The run aborted without touching state.
    HardFailure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::PartialFailure => "partial_failure",
            RunOutcome::HardFailure => "hard_failure",
        }
    }
}

/// Structured result of `run_once`, printed as JSON by the binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Decision reason, `superseded`, `delivery_failed`, or an error kind.
    pub reason: String,
    pub previous: Option<SeverityTier>,
    pub current: Option<SeverityTier>,
    pub notified: bool,
    pub frames_used: usize,
    pub frames_skipped: usize,
    pub error: Option<String>,
}

impl RunReport {
    pub fn hard_failure(err: &RunError, frames_used: usize, frames_skipped: usize) -> Self {
        RunReport {
            frames_used,
            frames_skipped,
            ..Self::aborted(err.kind(), err.to_string())
        }
    }

    /// A run that could not start, e.g. on a configuration error.
    pub fn aborted(reason: &str, error: String) -> Self {
        RunReport {
            outcome: RunOutcome::HardFailure,
            reason: reason.to_string(),
            previous: None,
            current: None,
            notified: false,
            frames_used: 0,
            frames_skipped: 0,
            error: Some(error),
        }
    }

    pub fn is_hard_failure(&self) -> bool {
        self.outcome == RunOutcome::HardFailure
    }
}

#[derive(Debug, Default)]
struct FrameTally {
    used: usize,
    /// Real fetch or decode failures.
    skipped: usize,
    /// Listed slots the feed has not published yet.
    unpublished: usize,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor<S, B, N> {
    source: S,
    store: StateStore<B>,
    notifier: N,
    classifier: Classifier,
    settings: MonitorSettings,
}

impl<S, B, N> Monitor<S, B, N>
where
    S: FrameSource,
    B: KvBackend,
    N: Notifier,
{
    pub fn new(
        source: S,
        store: StateStore<B>,
        notifier: N,
        classifier: Classifier,
        settings: MonitorSettings,
    ) -> Self {
        Monitor {
            source,
            store,
            notifier,
            classifier,
            settings,
        }
    }

    pub fn store(&self) -> &StateStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore<B> {
        &mut self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn run_once(&mut self) -> RunReport {
        self.run_once_at(Utc::now())
    }

    /// Runs one evaluation as of `now`. Never panics on run failures; every
    /// failure is folded into the report.
    pub fn run_once_at(&mut self, now: DateTime<Utc>) -> RunReport {
        let mut tally = FrameTally::default();
        let report = match self.evaluate(now, &mut tally) {
            Ok(report) => report,
            Err(err) => RunReport::hard_failure(&err, tally.used, tally.skipped),
        };
        logging::log_run_summary(
            &self.settings.owner_id,
            report.outcome.as_str(),
            &report.reason,
            report.frames_used,
            report.frames_skipped,
        );
        report
    }

    fn load_profile(&mut self) -> Result<Profile, RunError> {
        let owner = &self.settings.owner_id;
        match self.store.get_profile(owner) {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(RunError::ProfileMissing(owner.clone())),
            Err(StoreError::Corrupt { .. }) => Err(RunError::ProfileMissing(owner.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches and classifies the newest K published frames. Returns one
    /// observation per usable frame.
    ///
    /// Slots the feed has not published yet (404) are passed over and do
    /// not use up the budget, so publishing lag falls back to older frames
    /// still inside the window. Any other fetch failure uses up its slot
    /// and counts as skipped.
    fn observe(
        &self,
        profile: &Profile,
        now: DateTime<Utc>,
        tally: &mut FrameTally,
    ) -> Result<Vec<(DateTime<Utc>, SeverityTier)>, RunError> {
        let handles = self.source.list_recent_frames(self.settings.max_age, now)?;
        if handles.is_empty() {
            return Err(RunError::InsufficientData(
                "no radar frames within the recency window".into(),
            ));
        }

        let budget = self.settings.frame_count.max(1);
        let mut observations = Vec::new();
        for handle in &handles {
            if tally.used + tally.skipped == budget {
                break;
            }
            let frame = match self.source.fetch(handle) {
                Ok(frame) => frame,
                Err(err) => {
                    logging::log_frame_failure(&err);
                    if err.is_unpublished_frame() {
                        tally.unpublished += 1;
                    } else {
                        tally.skipped += 1;
                    }
                    continue;
                }
            };
            let (width, height) = (frame.image.width(), frame.image.height());
            // A pin outside the box is a calibration error, not a bad frame.
            let position = geo::to_pixel(
                profile.pin_latitude,
                profile.pin_longitude,
                &frame.bounds,
                width,
                height,
            )?;
            let pixel = geo::nearest_pixel(position, width, height);
            let tier = self.classifier.classify(&frame.image, pixel);
            debug!(frame = %frame.token, x = pixel.0, y = pixel.1, %tier, "classified frame");
            observations.push((frame.captured_at, tier));
            tally.used += 1;
        }
        if tally.unpublished > 0 {
            debug!(unpublished = tally.unpublished, "passed over unpublished slots");
        }
        Ok(observations)
    }

    fn evaluate(&mut self, now: DateTime<Utc>, tally: &mut FrameTally) -> Result<RunReport, RunError> {
        let profile = self.load_profile()?;
        let observations = self.observe(&profile, now, tally)?;
        let current = aggregate(&observations, self.settings.frame_count)?;
        let observed_at = observations
            .iter()
            .map(|(at, _)| *at)
            .max()
            .unwrap_or(now);

        let owner = self.settings.owner_id.clone();
        let persisted = self.store.get_alert_state(&owner)?;
        let decision = decide(
            persisted.as_ref().map(|v| &v.value),
            current,
            now,
            self.settings.cold_start,
        );
        info!(
            owner_id = %owner,
            previous = %decision.previous,
            %current,
            reason = decision.reason.as_str(),
            "severity evaluated"
        );

        let frames_outcome = if tally.skipped > 0 {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };
        let mut report = RunReport {
            outcome: frames_outcome,
            reason: decision.reason.as_str().to_string(),
            previous: Some(decision.previous),
            current: Some(current),
            notified: false,
            frames_used: tally.used,
            frames_skipped: tally.skipped,
            error: None,
        };

        match self
            .store
            .put_alert_state(&owner, &decision.next_state, persisted.as_ref())?
        {
            PutOutcome::Applied => {}
            PutOutcome::Conflict => {
                info!(owner_id = %owner, "alert state changed by a concurrent run; standing down");
                report.reason = "superseded".to_string();
                return Ok(report);
            }
        }

        if !decision.notify {
            return Ok(report);
        }

        let target = self
            .settings
            .target_override
            .clone()
            .unwrap_or_else(|| profile.notification_target.clone());
        let message = format_alert_message(decision.previous, current, observed_at, tally.used);
        match self.notifier.send(&target, &message) {
            Ok(()) => report.notified = true,
            Err(err) => {
                logging::log_delivery_failure(&target, &err);
                warn!(owner_id = %owner, "state persisted; this transition will not be re-announced");
                let err = RunError::from(err);
                report.outcome = RunOutcome::PartialFailure;
                report.reason = err.kind().to_string();
                report.error = Some(err.to_string());
            }
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_failure_report_carries_error_kind() {
        let err = RunError::InsufficientData("nothing usable".into());
        let report = RunReport::hard_failure(&err, 0, 3);
        assert!(report.is_hard_failure());
        assert_eq!(report.reason, "insufficient_data");
        assert_eq!(report.frames_skipped, 3);
        assert!(report.error.unwrap().contains("nothing usable"));
    }

    #[test]
    fn test_report_serializes_snake_case_outcome_and_tiers() {
        let report = RunReport {
            outcome: RunOutcome::PartialFailure,
            reason: "upward_transition".into(),
            previous: Some(SeverityTier::None),
            current: Some(SeverityTier::Light),
            notified: true,
            frames_used: 2,
            frames_skipped: 1,
            error: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "partial_failure");
        assert_eq!(json["previous"], "NONE");
        assert_eq!(json["current"], "LIGHT");
        assert_eq!(json["frames_skipped"], 1);
    }

    #[test]
    fn test_default_settings() {
        let settings = MonitorSettings::new("me");
        assert_eq!(settings.frame_count, 3);
        assert_eq!(settings.max_age, Duration::from_secs(1800));
        assert_eq!(settings.cold_start, ColdStart::AlertImmediately);
    }
}
