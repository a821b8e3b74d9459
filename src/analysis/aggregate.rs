//! Multi-frame risk aggregation.
//!
//! A single frame can under-report: a rendering glitch, or a cell just
//! entering the neighbourhood. The current severity is the maximum over the
//! most recent `window` frames. Detecting rain clearing is delayed by up to
//! `window` frames; only upward transitions alert, so that costs nothing.

use crate::model::{RunError, SeverityTier};
use chrono::{DateTime, Utc};

/// Maximum tier among the `window` most recent observations.
///
/// Observation order does not matter. A `window` of zero is treated as one.
/// Fails with `InsufficientData` when there is nothing to aggregate.
pub fn aggregate(
    observations: &[(DateTime<Utc>, SeverityTier)],
    window: usize,
) -> Result<SeverityTier, RunError> {
    if observations.is_empty() {
        return Err(RunError::InsufficientData(
            "no usable radar frames to aggregate".into(),
        ));
    }
    let mut newest_first = observations.to_vec();
    newest_first.sort_by(|a, b| b.0.cmp(&a.0));
    let tier = newest_first
        .into_iter()
        .take(window.max(1))
        .map(|(_, tier)| tier)
        .max()
        .unwrap_or_default();
    Ok(tier)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use SeverityTier::{Heavy, Light, Moderate};

    fn obs(minute: u32, tier: SeverityTier) -> (DateTime<Utc>, SeverityTier) {
        (Utc.with_ymd_and_hms(2026, 2, 16, 7, minute, 0).unwrap(), tier)
    }

    #[test]
    fn test_returns_maximum_tier_in_window() {
        let frames = [obs(10, SeverityTier::None), obs(5, Light), obs(0, SeverityTier::None)];
        assert_eq!(aggregate(&frames, 3), Ok(Light));
    }

    #[test]
    fn test_removing_a_non_maximal_frame_never_changes_result() {
        let frames = vec![obs(20, Light), obs(15, Heavy), obs(10, Moderate), obs(5, SeverityTier::None)];
        let full = aggregate(&frames, 4).unwrap();
        for skip in 0..frames.len() {
            if frames[skip].1 == full {
                continue;
            }
            let reduced: Vec<_> = frames
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, o)| *o)
                .collect();
            assert_eq!(aggregate(&reduced, 4).unwrap(), full, "removed frame {}", skip);
        }
    }

    #[test]
    fn test_only_the_most_recent_frames_count() {
        // Heavy rain 25 minutes ago falls outside a window of 3.
        let frames = [obs(25, Light), obs(20, SeverityTier::None), obs(15, SeverityTier::None), obs(10, Heavy)];
        assert_eq!(aggregate(&frames, 3), Ok(Light));
        assert_eq!(aggregate(&frames, 4), Ok(Heavy));
    }

    #[test]
    fn test_input_order_is_irrelevant() {
        let frames = [obs(0, Heavy), obs(30, SeverityTier::None), obs(20, Light), obs(25, SeverityTier::None)];
        assert_eq!(aggregate(&frames, 3), Ok(Light));
    }

    #[test]
    fn test_empty_input_is_insufficient_data() {
        let err = aggregate(&[], 3).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_zero_window_uses_newest_frame() {
        let frames = [obs(10, Moderate), obs(5, Heavy)];
        assert_eq!(aggregate(&frames, 0), Ok(Moderate));
    }
}
