//! Radar calibration: the legend table, image bounding box, and feed layout.
//!
//! These values belong to one specific upstream radar product and change
//! only when that product changes. They are loaded from a versioned TOML
//! file so recalibration never touches classification or alerting logic.
//!
//! ```toml
//! version = "sg-dpsri-70km-2026-02"
//!
//! [bounds]
//! min_lat = 1.163
//! max_lat = 1.493
//! min_lng = 103.577
//! max_lng = 104.077
//!
//! [source]
//! base_url = "https://www.weather.gov.sg/files/rainarea/50km/v2"
//! prefix = "dpsri_70km_"
//! suffix = "0000dBR.dpsri.png"
//! utc_offset_minutes = 480
//!
//! [source.listing]
//! mode = "slots"
//! slot_minutes = 5
//! slot_count = 7
//!
//! [[legend]]
//! color = "#66CCFF"
//! tier = "LIGHT"
//! ```

use crate::model::{BoundingBox, Rgba, SeverityTier};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest neighbourhood radius accepted, in pixels.
pub const MAX_SAMPLE_RADIUS: u32 = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("calibration parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid calibration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

/// An opaque RGB reference colour written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        HexColor { r, g, b }
    }

    /// Euclidean distance in RGB space. Alpha is ignored.
    pub fn distance_to(&self, px: Rgba) -> f64 {
        let dr = f64::from(self.r) - f64::from(px.r);
        let dg = f64::from(self.g) - f64::from(px.g);
        let db = f64::from(self.b) - f64::from(px.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for HexColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("expected #RRGGBB colour, got '{}'", s));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("bad colour '{}': {}", s, e))
        };
        Ok(HexColor::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// ---------------------------------------------------------------------------
// Calibration document
// ---------------------------------------------------------------------------

/// One reference colour of the radar legend and the tier it stands for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegendEntry {
    pub color: HexColor,
    pub tier: SeverityTier,
}

/// How recent frames are discovered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Listing {
    /// A JSON manifest of available timestamp tokens.
    Manifest { manifest_url: String },
    /// No manifest: frames are published at fixed wall-clock slots.
    Slots { slot_minutes: u32, slot_count: u32 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceSettings {
    pub base_url: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    /// chrono format of the timestamp token embedded in frame file names.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Offset of the feed's local clock from UTC, used for tokens.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub listing: Listing,
}

fn default_timestamp_format() -> String {
    "%Y%m%d%H%M".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// Neighbourhood radius around the pin, in pixels.
    pub radius: u32,
    /// Colours further than this from every legend entry count as NONE.
    pub max_color_distance: f64,
    /// Pixels below this alpha are transparent.
    pub min_alpha: u8,
    /// Pixels with a mean RGB value below this are treated as empty.
    pub min_brightness: f64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        SamplingSettings {
            radius: 4,
            max_color_distance: 170.0,
            min_alpha: 15,
            min_brightness: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Calibration {
    /// Free-form label of the calibration revision, surfaced in logs.
    pub version: String,
    pub bounds: BoundingBox,
    pub source: SourceSettings,
    #[serde(default)]
    pub sampling: SamplingSettings,
    pub legend: Vec<LegendEntry>,
}

impl Calibration {
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CalibrationError> {
        let calibration: Calibration = toml::from_str(text)?;
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !self.bounds.is_well_formed() {
            return Err(CalibrationError::Invalid(format!(
                "bounds must satisfy min < max on both axes, got {:?}",
                self.bounds
            )));
        }
        if self.legend.is_empty() {
            return Err(CalibrationError::Invalid("legend has no entries".into()));
        }
        if self.sampling.radius > MAX_SAMPLE_RADIUS {
            return Err(CalibrationError::Invalid(format!(
                "sampling radius {} exceeds {}",
                self.sampling.radius, MAX_SAMPLE_RADIUS
            )));
        }
        if !(self.sampling.max_color_distance.is_finite() && self.sampling.max_color_distance >= 0.0)
        {
            return Err(CalibrationError::Invalid(
                "max_color_distance must be a non-negative number".into(),
            ));
        }
        if let Listing::Slots {
            slot_minutes,
            slot_count,
        } = self.source.listing
        {
            if slot_minutes == 0 || slot_minutes > 60 || 60 % slot_minutes != 0 {
                return Err(CalibrationError::Invalid(format!(
                    "slot_minutes must divide an hour, got {}",
                    slot_minutes
                )));
            }
            if slot_count == 0 {
                return Err(CalibrationError::Invalid("slot_count must be at least 1".into()));
            }
        }
        if self.source.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(CalibrationError::Invalid(format!(
                "utc_offset_minutes out of range: {}",
                self.source.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        version = "test-1"

        [bounds]
        min_lat = 1.0
        max_lat = 1.8
        min_lng = 103.0
        max_lng = 104.2

        [source]
        base_url = "https://radar.example.com/frames"
        prefix = "r_"
        suffix = ".png"

        [source.listing]
        mode = "manifest"
        manifest_url = "https://radar.example.com/manifest.json"

        [[legend]]
        color = "#3399FF"
        tier = "LIGHT"

        [[legend]]
        color = "#FF3300"
        tier = "HEAVY"
    "##;

    #[test]
    fn test_hex_color_parses_with_and_without_hash() {
        assert_eq!("#3399FF".parse::<HexColor>(), Ok(HexColor::new(0x33, 0x99, 0xFF)));
        assert_eq!("ff3300".parse::<HexColor>(), Ok(HexColor::new(0xFF, 0x33, 0x00)));
        assert!("#12345".parse::<HexColor>().is_err());
        assert!("#GG0000".parse::<HexColor>().is_err());
        assert_eq!(HexColor::new(0x33, 0x99, 0xFF).to_string(), "#3399FF");
    }

    #[test]
    fn test_minimal_document_loads_with_sampling_defaults() {
        let cal = Calibration::from_toml_str(MINIMAL).expect("minimal calibration should load");
        assert_eq!(cal.legend.len(), 2);
        assert_eq!(cal.legend[1].tier, SeverityTier::Heavy);
        assert_eq!(cal.sampling, SamplingSettings::default());
        assert_eq!(cal.source.timestamp_format, "%Y%m%d%H%M");
        assert!(matches!(cal.source.listing, Listing::Manifest { .. }));
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let text = MINIMAL.replace("max_lat = 1.8", "max_lat = 0.5");
        let err = Calibration::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, CalibrationError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_empty_legend_is_rejected() {
        let cut = MINIMAL.find("[[legend]]").unwrap();
        let text = format!("legend = []\n{}", &MINIMAL[..cut]);
        assert!(Calibration::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_unknown_tier_in_legend_is_a_parse_error() {
        let text = MINIMAL.replace("tier = \"HEAVY\"", "tier = \"TORRENTIAL\"");
        let err = Calibration::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, CalibrationError::Parse(_)), "got {:?}", err);
    }

    #[test]
    fn test_slot_minutes_must_divide_an_hour() {
        let text = MINIMAL.replace(
            "mode = \"manifest\"\n        manifest_url = \"https://radar.example.com/manifest.json\"",
            "mode = \"slots\"\n        slot_minutes = 7\n        slot_count = 3",
        );
        let err = Calibration::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("slot_minutes"), "got {}", err);
    }
}
