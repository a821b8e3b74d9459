//! Frame staleness detection.
//!
//! The radar feed publishes a new frame every few minutes. An upstream cache
//! or a stalled renderer can keep serving the same old frames, which would
//! silently freeze the alert state. Frames older than the recency window are
//! dropped before they are downloaded.
//!
//! # Clock injection
//! All functions accept a `now: DateTime<Utc>` parameter rather than calling
//! `Utc::now()` internally, so tests are deterministic without mocking.

use crate::model::FrameHandle;
use chrono::{DateTime, Utc};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Returns `true` if `captured_at` is older than `max_age` relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age  →  stale
///   age == max_age →  not stale
///
/// Timestamps in the future (clock skew between us and the feed) are not stale.
pub fn is_stale_at(captured_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(captured_at);
    match age.to_std() {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}

/// Keeps handles inside the recency window, preserving their order.
pub fn retain_recent(
    handles: Vec<FrameHandle>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Vec<FrameHandle> {
    handles
        .into_iter()
        .filter(|h| !is_stale_at(h.captured_at, max_age, now))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// A fixed "now" used across all tests: 2026-02-16 07:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 7, 0, 0).unwrap()
    }

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn handle_at(hour: u32, minute: u32) -> FrameHandle {
        FrameHandle {
            token: format!("2026021615{:02}", minute),
            captured_at: Utc.with_ymd_and_hms(2026, 2, 16, hour, minute, 0).unwrap(),
            url: "https://radar.example.com/frame.png".to_string(),
        }
    }

    // --- Not stale ----------------------------------------------------------

    #[test]
    fn test_frame_5_minutes_old_is_not_stale() {
        let captured = Utc.with_ymd_and_hms(2026, 2, 16, 6, 55, 0).unwrap();
        assert!(!is_stale_at(captured, minutes(15), fixed_now()));
    }

    #[test]
    fn test_frame_exactly_at_threshold_is_not_stale() {
        let captured = Utc.with_ymd_and_hms(2026, 2, 16, 6, 45, 0).unwrap();
        assert!(
            !is_stale_at(captured, minutes(15), fixed_now()),
            "frame exactly at threshold (15 min) should not be stale; \
             staleness is strictly greater than, not >=",
        );
    }

    #[test]
    fn test_frame_from_the_future_is_not_stale() {
        let captured = Utc.with_ymd_and_hms(2026, 2, 16, 7, 2, 0).unwrap();
        assert!(!is_stale_at(captured, minutes(15), fixed_now()));
    }

    // --- Stale --------------------------------------------------------------

    #[test]
    fn test_frame_one_minute_past_threshold_is_stale() {
        let captured = Utc.with_ymd_and_hms(2026, 2, 16, 6, 44, 0).unwrap();
        assert!(is_stale_at(captured, minutes(15), fixed_now()));
    }

    #[test]
    fn test_frozen_feed_from_yesterday_is_stale() {
        let captured = Utc.with_ymd_and_hms(2026, 2, 15, 7, 0, 0).unwrap();
        assert!(is_stale_at(captured, minutes(30), fixed_now()));
    }

    // --- Filtering ----------------------------------------------------------

    #[test]
    fn test_retain_recent_drops_only_stale_handles_and_keeps_order() {
        let handles = vec![handle_at(6, 55), handle_at(6, 50), handle_at(6, 20), handle_at(6, 45)];
        let kept = retain_recent(handles, minutes(30), fixed_now());
        let tokens: Vec<_> = kept.iter().map(|h| h.captured_at).collect();
        assert_eq!(
            tokens,
            vec![
                Utc.with_ymd_and_hms(2026, 2, 16, 6, 55, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 2, 16, 6, 50, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 2, 16, 6, 45, 0).unwrap(),
            ]
        );
    }
}
