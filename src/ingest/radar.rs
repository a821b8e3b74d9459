//! Radar frame feed client
//!
//! Discovers the frames currently published by the upstream radar product
//! and downloads them as decoded RGBA rasters. Frame file names embed a
//! timestamp token in the feed's local time, e.g.
//! `dpsri_70km_2026021615000000dBR.dpsri.png` for 15:00 SGT.
//!
//! Two listing modes are supported (see `calibration::Listing`):
//! - manifest: `{ "frames": ["202602161500", "202602161455", ...] }`
//! - slots: candidate tokens stepped back from the current wall-clock slot

use crate::alert::staleness::retain_recent;
use crate::calibration::{Listing, SourceSettings};
use crate::model::{BoundingBox, FrameHandle, RadarFrame, RasterImage, RunError};
use crate::retry::RetryPolicy;
use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, Offset, TimeZone, Timelike, Utc,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("rainwatch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Frame source contract
// ============================================================================

/// Where frames come from. The pipeline only talks to this trait.
pub trait FrameSource {
    /// Frames no older than `max_age` at `now`, newest first.
    fn list_recent_frames(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<FrameHandle>, RunError>;

    /// Downloads and decodes one frame. Fails with `FrameUnavailable`.
    fn fetch(&self, handle: &FrameHandle) -> Result<RadarFrame, RunError>;
}

// ============================================================================
// Manifest / token helpers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub frames: Vec<String>,
}

fn feed_offset(settings: &SourceSettings) -> FixedOffset {
    FixedOffset::east_opt(settings.utc_offset_minutes * 60)
        .unwrap_or_else(|| Utc.fix())
}

/// Full URL of the frame file for a timestamp token.
pub fn build_frame_url(settings: &SourceSettings, token: &str) -> String {
    format!(
        "{}/{}{}{}",
        settings.base_url.trim_end_matches('/'),
        settings.prefix,
        token,
        settings.suffix
    )
}

/// Parses a timestamp token in the feed's local time into UTC.
pub fn parse_token(settings: &SourceSettings, token: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(token.trim(), &settings.timestamp_format).ok()?;
    feed_offset(settings)
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_token(settings: &SourceSettings, at: DateTime<Utc>) -> String {
    at.with_timezone(&feed_offset(settings))
        .format(&settings.timestamp_format)
        .to_string()
}

fn handle_for(settings: &SourceSettings, token: String, captured_at: DateTime<Utc>) -> FrameHandle {
    FrameHandle {
        url: build_frame_url(settings, &token),
        token,
        captured_at,
    }
}

/// Parses a manifest body into handles sorted newest first.
///
/// Unparseable tokens are skipped; a body that is not a manifest at all is
/// `SourceUnavailable`.
pub fn parse_manifest(settings: &SourceSettings, body: &str) -> Result<Vec<FrameHandle>, RunError> {
    let manifest: Manifest = serde_json::from_str(body)
        .map_err(|e| RunError::SourceUnavailable(format!("Parse error: {}", e)))?;

    let mut handles: Vec<FrameHandle> = manifest
        .frames
        .into_iter()
        .filter_map(|token| match parse_token(settings, &token) {
            Some(at) => Some(handle_for(settings, token, at)),
            None => {
                debug!(token = %token, "skipping unparseable manifest entry");
                None
            }
        })
        .collect();
    handles.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
    handles.dedup_by(|a, b| a.token == b.token);
    Ok(handles)
}

/// Candidate handles for a feed that publishes on fixed wall-clock slots.
///
/// `now` is floored to the slot in the feed's local time, then stepped back
/// `slot_count - 1` times.
pub fn slot_handles(
    settings: &SourceSettings,
    slot_minutes: u32,
    slot_count: u32,
    now: DateTime<Utc>,
) -> Vec<FrameHandle> {
    let step = slot_minutes.max(1);
    let local = now.with_timezone(&feed_offset(settings));
    let floored_minute = (local.minute() / step) * step;
    let floored = local
        .with_minute(floored_minute)
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(local);

    (0..slot_count)
        .map(|i| {
            let at = (floored - ChronoDuration::minutes(i64::from(i * step))).with_timezone(&Utc);
            handle_for(settings, format_token(settings, at), at)
        })
        .collect()
}

// ============================================================================
// PNG decoding
// ============================================================================

/// Decodes any 8/16-bit PNG into an RGBA8 raster.
pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, String> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|e| format!("PNG decode error: {}", e))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| format!("PNG decode error: {}", e))?;
    buf.truncate(info.buffer_size());

    let rgba: Vec<u8> = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        png::ColorType::Indexed => {
            return Err("PNG decode error: palette was not expanded".to_string());
        }
    };

    RasterImage::new(info.width, info.height, rgba)
        .ok_or_else(|| format!("PNG decode error: unexpected buffer size for {}x{}", info.width, info.height))
}

// ============================================================================
// HTTP client
// ============================================================================

/// Frame source backed by the public radar HTTP feed.
pub struct HttpFrameSource {
    client: reqwest::blocking::Client,
    settings: SourceSettings,
    bounds: BoundingBox,
    retry: RetryPolicy,
}

impl HttpFrameSource {
    /// `client` should carry a bounded timeout; see `build_http_client`.
    pub fn new(
        client: reqwest::blocking::Client,
        settings: SourceSettings,
        bounds: BoundingBox,
        retry: RetryPolicy,
    ) -> Self {
        HttpFrameSource {
            client,
            settings,
            bounds,
            retry,
        }
    }

    fn get_manifest(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status().as_u16()));
        }
        response.text().map_err(|e| e.to_string())
    }

    fn get_png(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP error: {}", status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("png") {
            return Err(format!("unexpected content type '{}'", content_type));
        }
        let payload = response.bytes().map_err(|e| e.to_string())?;
        if payload.is_empty() {
            return Err("empty response body".to_string());
        }
        Ok(payload.to_vec())
    }
}

/// Blocking HTTP client with a bounded per-request timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// 404s are expected for a slot that has not been published yet; everything
/// else is worth a second try.
fn worth_retrying(error: &String) -> bool {
    !error.starts_with("HTTP error: 404")
}

impl FrameSource for HttpFrameSource {
    fn list_recent_frames(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<FrameHandle>, RunError> {
        let handles = match &self.settings.listing {
            Listing::Manifest { manifest_url } => {
                let body = self
                    .retry
                    .run("radar manifest", |_| self.get_manifest(manifest_url), worth_retrying)
                    .map_err(RunError::SourceUnavailable)?;
                parse_manifest(&self.settings, &body)?
            }
            Listing::Slots {
                slot_minutes,
                slot_count,
            } => slot_handles(&self.settings, *slot_minutes, *slot_count, now),
        };
        let listed = handles.len();
        let recent = retain_recent(handles, max_age, now);
        info!(listed, recent = recent.len(), "listed radar frames");
        Ok(recent)
    }

    fn fetch(&self, handle: &FrameHandle) -> Result<RadarFrame, RunError> {
        let unavailable = |reason: String| RunError::FrameUnavailable {
            token: handle.token.clone(),
            reason,
        };
        let bytes = self
            .retry
            .run("radar frame", |_| self.get_png(&handle.url), worth_retrying)
            .map_err(unavailable)?;
        let image = decode_png(&bytes).map_err(unavailable)?;
        debug!(
            token = %handle.token,
            width = image.width(),
            height = image.height(),
            "decoded radar frame"
        );
        Ok(RadarFrame {
            token: handle.token.clone(),
            captured_at: handle.captured_at,
            image,
            bounds: self.bounds,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
