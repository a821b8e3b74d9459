//! Structured logging for the rain-alert service
//!
//! Wraps `tracing` with the service's component tags and a failure
//! classifier, so a missing radar slot logs quietly while a broken feed or
//! bot token logs loudly. Console output goes to stderr (stdout carries the
//! JSON run report); an optional append-only file mirrors it.

use crate::model::RunError;
use crate::notify::NotifyError;
use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Default filter directive when `RUST_LOG` is not set.
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "rainwatch=debug,info",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Radar,
    Store,
    Notify,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Radar => write!(f, "RADAR"),
            Component::Store => write!(f, "STORE"),
            Component::Notify => write!(f, "NOTIFY"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - frame slot not published yet
    Expected,
    /// Unexpected failure - feed degraded, format changed, or credentials wrong
    Unexpected,
    /// Unknown - cannot tell which
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber. `RUST_LOG` overrides `min_level`.
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.directive()));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("cannot open log file {}: {}", path, e))?;
            Some(
                tfmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tfmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-frame fetch or decode failure.
pub fn classify_frame_failure(reason: &str) -> FailureType {
    // Slots are listed before the feed publishes them.
    if reason.contains("HTTP error: 404") {
        FailureType::Expected
    } else if reason.contains("HTTP error")
        || reason.contains("timed out")
        || reason.contains("timeout")
        || reason.contains("PNG")
        || reason.contains("content type")
    {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Classify a notification failure. Client errors mean the bot token or chat
/// id is wrong and will not fix themselves.
pub fn classify_delivery_failure(err: &NotifyError) -> FailureType {
    match err {
        NotifyError::Rejected { status, .. } if (400..500).contains(status) && *status != 429 => {
            FailureType::Unexpected
        }
        NotifyError::NotAccepted(_) => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a skipped frame at a level matching its classification.
pub fn log_frame_failure(err: &RunError) {
    let (token, reason) = match err {
        RunError::FrameUnavailable { token, reason } => (token.as_str(), reason.as_str()),
        other => ("-", other.kind()),
    };
    let failure_type = classify_frame_failure(reason);
    let component = Component::Radar;
    match failure_type {
        FailureType::Expected => debug!(%component, frame = token, %failure_type, reason, "frame skipped"),
        FailureType::Unexpected => error!(%component, frame = token, %failure_type, reason, "frame skipped"),
        FailureType::Unknown => warn!(%component, frame = token, %failure_type, reason, "frame skipped"),
    }
}

pub fn log_delivery_failure(target: &str, err: &NotifyError) {
    let failure_type = classify_delivery_failure(err);
    let component = Component::Notify;
    match failure_type {
        FailureType::Unexpected => error!(%component, chat = target, %failure_type, error = %err, "notification failed"),
        _ => warn!(%component, chat = target, %failure_type, error = %err, "notification failed"),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one evaluation run.
pub fn log_run_summary(owner_id: &str, outcome: &str, reason: &str, used: usize, skipped: usize) {
    let total = used + skipped;
    let component = Component::System;
    if outcome == "hard_failure" {
        error!(%component, owner_id, outcome, reason, "run failed: {}/{} frames usable", used, total);
    } else if skipped > 0 || outcome != "success" {
        warn!(%component, owner_id, outcome, reason, "run degraded: {}/{} frames usable", used, total);
    } else {
        info!(%component, owner_id, outcome, reason, "run complete: {}/{} frames usable", used, total);
    }
}
