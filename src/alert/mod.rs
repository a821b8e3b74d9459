//! Alerting: frame staleness and the severity transition state machine.
//!
//! Submodules:
//! - `staleness`: drops frames outside the recency window.
//! - `transition`: decides whether a run is an upward transition.

pub mod staleness;
pub mod transition;
