//! Core data types for the radar rain-alert service.
//!
//! This module defines the shared domain model imported by all other modules:
//! the seeded profile, the ordered severity tiers, the persisted alert state,
//! the ephemeral radar frame, and the run-level error taxonomy.
//! It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Severity tiers
// ---------------------------------------------------------------------------

/// Ordinal rain-intensity category derived from radar colour.
///
/// The derive order is the severity order:
///   None < Light < Moderate < Heavy
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityTier {
    #[default]
    None,
    Light,
    Moderate,
    Heavy,
}

impl SeverityTier {
    pub const ALL: [SeverityTier; 4] = [
        SeverityTier::None,
        SeverityTier::Light,
        SeverityTier::Moderate,
        SeverityTier::Heavy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::None => "NONE",
            SeverityTier::Light => "LIGHT",
            SeverityTier::Moderate => "MODERATE",
            SeverityTier::Heavy => "HEAVY",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown severity tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for SeverityTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeverityTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// The pinned location and delivery target for one owner.
///
/// Written once by an external seeding step; the service only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub owner_id: String,
    pub pin_latitude: f64,
    pub pin_longitude: f64,
    pub notification_target: String,
}

/// Last known severity for one owner.
///
/// Only ever reflects a run that completed aggregation; a run that failed
/// to acquire or classify frames never touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub last_severity: SeverityTier,
    pub last_observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_sent_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// Geographic rectangle covered by a radar image, in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Inclusive on all edges. NaN coordinates are never contained.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }

    pub fn is_well_formed(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lng, self.max_lng]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat < self.max_lat
            && self.min_lng < self.max_lng
    }
}

// ---------------------------------------------------------------------------
// Raster types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Rgba { r, g, b, a: 255 }
    }
}

/// Decoded RGBA8 raster, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl RasterImage {
    /// Returns `None` when the buffer length does not match `width * height * 4`
    /// or the image is empty.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || rgba.len() != expected {
            return None;
        }
        Some(RasterImage { width, height, rgba })
    }

    /// A raster filled with a single colour.
    pub fn filled(width: u32, height: u32, color: Rgba) -> Option<Self> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        let rgba = [color.r, color.g, color.b, color.a].repeat(pixels);
        Self::new(width, height, rgba)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `None` when the coordinate is outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        Some(Rgba {
            r: self.rgba[idx],
            g: self.rgba[idx + 1],
            b: self.rgba[idx + 2],
            a: self.rgba[idx + 3],
        })
    }

    /// No-op when the coordinate is out of range.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba[idx..idx + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One entry of the feed listing, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    /// Timestamp token as it appears in the feed, e.g. "202602161500".
    pub token: String,
    pub captured_at: DateTime<Utc>,
    pub url: String,
}

/// A downloaded and decoded radar frame. Produced per run and discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarFrame {
    pub token: String,
    pub captured_at: DateTime<Utc>,
    pub image: RasterImage,
    pub bounds: BoundingBox,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures that can end or degrade a single evaluation run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    /// The frame listing could not be fetched or parsed.
    #[error("radar source unavailable: {0}")]
    SourceUnavailable(String),
    /// One frame could not be fetched or decoded. Recoverable by skipping it.
    #[error("frame {token} unavailable: {reason}")]
    FrameUnavailable { token: String, reason: String },
    /// The pinned point is outside the radar image. A calibration error.
    #[error("pin ({lat}, {lng}) lies outside the radar bounding box")]
    OutOfBounds { lat: f64, lng: f64 },
    /// No usable frame remained after filtering and fetching.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
    /// The seeded profile record is absent or unreadable.
    #[error("profile missing for owner {0}")]
    ProfileMissing(String),
}

impl RunError {
    /// Stable identifier used in run reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::SourceUnavailable(_) => "source_unavailable",
            RunError::FrameUnavailable { .. } => "frame_unavailable",
            RunError::OutOfBounds { .. } => "out_of_bounds",
            RunError::InsufficientData(_) => "insufficient_data",
            RunError::StoreUnavailable(_) => "store_unavailable",
            RunError::DeliveryFailed(_) => "delivery_failed",
            RunError::ProfileMissing(_) => "profile_missing",
        }
    }

    /// A frame the feed has not published yet (HTTP 404). Slot listings
    /// run ahead of the feed, so this is routine rather than a failure.
    pub fn is_unpublished_frame(&self) -> bool {
        matches!(
            self,
            RunError::FrameUnavailable { reason, .. } if reason.starts_with("HTTP error: 404")
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
