//! Calibration Probe
//!
//! Samples the live feed at an arbitrary coordinate and reports, per frame,
//! the pixel it maps to, the colour found there, the closest legend entry,
//! and the tier the classifier would assign. Use this after changing the
//! bounding box or legend, before trusting alerts. Never touches the store.

use crate::analysis::aggregate::aggregate;
use crate::analysis::classify::Classifier;
use crate::calibration::HexColor;
use crate::geo;
use crate::ingest::radar::FrameSource;
use crate::model::{RadarFrame, RunError, SeverityTier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// Probe Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub frames: Vec<FrameProbe>,
    /// Tier `run` would compute from the same frames.
    pub aggregated: Option<SeverityTier>,
    pub summary: ProbeSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub total: usize,
    pub usable: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameProbe {
    pub token: String,
    pub captured_at: DateTime<Utc>,
    pub status: ProbeStatus,
    pub pixel: Option<(u32, u32)>,
    /// Colour at the centre pixel, "#RRGGBB".
    pub center_color: Option<String>,
    pub center_alpha: Option<u8>,
    pub nearest_legend_color: Option<String>,
    pub nearest_legend_tier: Option<SeverityTier>,
    pub nearest_distance: Option<f64>,
    /// Neighbourhood tier, as used for alerting.
    pub tier: Option<SeverityTier>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    Failed,
}

impl FrameProbe {
    fn failed(token: &str, captured_at: DateTime<Utc>, error: &RunError) -> Self {
        FrameProbe {
            token: token.to_string(),
            captured_at,
            status: ProbeStatus::Failed,
            pixel: None,
            center_color: None,
            center_alpha: None,
            nearest_legend_color: None,
            nearest_legend_tier: None,
            nearest_distance: None,
            tier: None,
            error_message: Some(error.to_string()),
        }
    }
}

// ============================================================================
// Probing
// ============================================================================

/// Inspects one decoded frame at a coordinate.
pub fn probe_frame(classifier: &Classifier, frame: &RadarFrame, lat: f64, lng: f64) -> FrameProbe {
    let (width, height) = (frame.image.width(), frame.image.height());
    let position = match geo::to_pixel(lat, lng, &frame.bounds, width, height) {
        Ok(position) => position,
        Err(e) => return FrameProbe::failed(&frame.token, frame.captured_at, &e),
    };
    let pixel = geo::nearest_pixel(position, width, height);
    let center = match frame.image.pixel(pixel.0, pixel.1) {
        Some(center) => center,
        None => {
            let err = RunError::OutOfBounds { lat, lng };
            return FrameProbe::failed(&frame.token, frame.captured_at, &err);
        }
    };
    let nearest = classifier.nearest(center);

    FrameProbe {
        token: frame.token.clone(),
        captured_at: frame.captured_at,
        status: ProbeStatus::Success,
        pixel: Some(pixel),
        center_color: Some(HexColor::new(center.r, center.g, center.b).to_string()),
        center_alpha: Some(center.a),
        nearest_legend_color: nearest.as_ref().map(|m| m.entry.color.to_string()),
        nearest_legend_tier: nearest.as_ref().map(|m| m.entry.tier),
        nearest_distance: nearest.as_ref().map(|m| (m.distance * 10.0).round() / 10.0),
        tier: Some(classifier.classify(&frame.image, pixel)),
        error_message: None,
    }
}

/// Lists recent frames and probes them newest first until `frame_count`
/// are usable. Slots the feed has not published yet are passed over, the
/// same way `run` does.
///
/// Only a listing failure is an error; per-frame failures are reported
/// inside the result.
pub fn probe_location<S: FrameSource>(
    source: &S,
    classifier: &Classifier,
    lat: f64,
    lng: f64,
    max_age: Duration,
    frame_count: usize,
    now: DateTime<Utc>,
) -> Result<ProbeReport, RunError> {
    let handles = source.list_recent_frames(max_age, now)?;

    let budget = frame_count.max(1);
    let mut frames = Vec::new();
    let mut attempted = 0;
    for handle in &handles {
        if attempted == budget {
            break;
        }
        let probe = match source.fetch(handle) {
            Ok(frame) => probe_frame(classifier, &frame, lat, lng),
            Err(e) if e.is_unpublished_frame() => continue,
            Err(e) => FrameProbe::failed(&handle.token, handle.captured_at, &e),
        };
        attempted += 1;
        frames.push(probe);
    }

    let observations: Vec<(DateTime<Utc>, SeverityTier)> = frames
        .iter()
        .filter_map(|f| f.tier.map(|tier| (f.captured_at, tier)))
        .collect();
    let usable = observations.len();

    Ok(ProbeReport {
        timestamp: now.to_rfc3339(),
        latitude: lat,
        longitude: lng,
        summary: ProbeSummary {
            total: frames.len(),
            usable,
            failed: frames.len() - usable,
        },
        aggregated: aggregate(&observations, frame_count).ok(),
        frames,
    })
}

/// Human-readable summary on stderr; stdout carries the JSON report.
pub fn print_summary(report: &ProbeReport) {
    eprintln!("\n{}", "=".repeat(60));
    eprintln!("PROBE ({:.4}, {:.4})", report.latitude, report.longitude);
    eprintln!("{}", "=".repeat(60));
    for frame in &report.frames {
        match frame.status {
            ProbeStatus::Success => eprintln!(
                "  {}  pixel {:?}  color {} -> nearest {} (d={:.1})  tier {}",
                frame.token,
                frame.pixel.unwrap_or_default(),
                frame.center_color.as_deref().unwrap_or("-"),
                frame.nearest_legend_color.as_deref().unwrap_or("-"),
                frame.nearest_distance.unwrap_or(f64::NAN),
                frame.tier.unwrap_or_default(),
            ),
            ProbeStatus::Failed => eprintln!(
                "  {}  FAILED: {}",
                frame.token,
                frame.error_message.as_deref().unwrap_or("unknown")
            ),
        }
    }
    eprintln!(
        "Usable frames: {}/{}  aggregated tier: {}",
        report.summary.usable,
        report.summary.total,
        report
            .aggregated
            .map(|t| t.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    eprintln!("{}", "=".repeat(60));
}

// ============================================================================
// Tests
// ============================================================================
