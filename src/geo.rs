//! Geographic calibration: latitude/longitude to radar pixel and back.
//!
//! The radar products covered here span well under a degree, so each axis is
//! interpolated linearly and independently. Pixel centres run from 0 to
//! `width - 1` (west to east) and 0 to `height - 1` (north to south).

use crate::model::{BoundingBox, RunError};

/// Maps a coordinate to a fractional pixel position inside an image of the
/// given size covering `bounds`.
///
/// Fails with `OutOfBounds` when the coordinate lies outside `bounds`; the
/// point is never clamped onto the image edge.
pub fn to_pixel(
    lat: f64,
    lng: f64,
    bounds: &BoundingBox,
    width: u32,
    height: u32,
) -> Result<(f64, f64), RunError> {
    if !bounds.contains(lat, lng) {
        return Err(RunError::OutOfBounds { lat, lng });
    }
    let x_fraction = (lng - bounds.min_lng) / (bounds.max_lng - bounds.min_lng);
    let y_fraction = (bounds.max_lat - lat) / (bounds.max_lat - bounds.min_lat);
    let x = x_fraction * f64::from(width.saturating_sub(1));
    let y = y_fraction * f64::from(height.saturating_sub(1));
    Ok((x, y))
}

/// Inverse of [`to_pixel`].
pub fn to_geo(x: f64, y: f64, bounds: &BoundingBox, width: u32, height: u32) -> (f64, f64) {
    let x_span = f64::from(width.saturating_sub(1)).max(1.0);
    let y_span = f64::from(height.saturating_sub(1)).max(1.0);
    let lng = bounds.min_lng + (x / x_span) * (bounds.max_lng - bounds.min_lng);
    let lat = bounds.max_lat - (y / y_span) * (bounds.max_lat - bounds.min_lat);
    (lat, lng)
}

/// Rounds a fractional position to the nearest pixel inside the image.
pub fn nearest_pixel(position: (f64, f64), width: u32, height: u32) -> (u32, u32) {
    let clamp = |v: f64, size: u32| -> u32 {
        let max = f64::from(size.saturating_sub(1));
        v.round().clamp(0.0, max) as u32
    };
    (clamp(position.0, width), clamp(position.1, height))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn singapore() -> BoundingBox {
        BoundingBox {
            min_lat: 1.163,
            max_lat: 1.493,
            min_lng: 103.577,
            max_lng: 104.077,
        }
    }

    #[test]
    fn test_corners_map_to_image_corners() {
        let b = singapore();
        assert_eq!(to_pixel(b.max_lat, b.min_lng, &b, 853, 479).unwrap(), (0.0, 0.0));
        let (x, y) = to_pixel(b.min_lat, b.max_lng, &b, 853, 479).unwrap();
        assert!((x - 852.0).abs() < 1e-9 && (y - 478.0).abs() < 1e-9, "got ({}, {})", x, y);
    }

    #[test]
    fn test_north_is_up_and_east_is_right() {
        let b = singapore();
        let (x_west, y_north) = to_pixel(1.45, 103.6, &b, 853, 479).unwrap();
        let (x_east, y_south) = to_pixel(1.20, 104.0, &b, 853, 479).unwrap();
        assert!(x_east > x_west);
        assert!(y_south > y_north);
    }

    #[test]
    fn test_outside_bounds_fails_instead_of_clamping() {
        let b = singapore();
        let err = to_pixel(1.60, 103.8, &b, 853, 479).unwrap_err();
        assert_eq!(err, RunError::OutOfBounds { lat: 1.60, lng: 103.8 });
        assert!(to_pixel(1.3, 103.0, &b, 853, 479).is_err());
    }

    #[test]
    fn test_round_trip_recovers_coordinate_within_sub_pixel_tolerance() {
        let b = singapore();
        let (w, h) = (853, 479);
        let lat_per_px = (b.max_lat - b.min_lat) / f64::from(h - 1);
        let lng_per_px = (b.max_lng - b.min_lng) / f64::from(w - 1);
        for &(lat, lng) in &[(1.3521, 103.8198), (1.2, 103.6), (1.49, 104.07), (1.163, 103.577)] {
            let (x, y) = to_pixel(lat, lng, &b, w, h).unwrap();
            let (lat2, lng2) = to_geo(x, y, &b, w, h);
            assert!((lat - lat2).abs() < lat_per_px * 0.01, "lat {} vs {}", lat, lat2);
            assert!((lng - lng2).abs() < lng_per_px * 0.01, "lng {} vs {}", lng, lng2);
        }
    }

    #[test]
    fn test_nearest_pixel_rounds_and_stays_in_image() {
        assert_eq!(nearest_pixel((119.6, 80.4), 241, 161), (120, 80));
        assert_eq!(nearest_pixel((-0.4, 500.0), 241, 161), (0, 160));
    }
}
