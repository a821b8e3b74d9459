//! Colour-to-severity classification.
//!
//! Each sampled pixel is matched to the nearest legend colour. Pixels that
//! are transparent, near-black, or further than the cutoff from every legend
//! entry (map background, borders, labels) count as NONE. A neighbourhood
//! reports the maximum tier it contains, so a small cell next to the pin is
//! never averaged away.

use crate::calibration::{Calibration, LegendEntry, SamplingSettings};
use crate::model::{RasterImage, Rgba, SeverityTier};

/// Closest legend entry for one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMatch<'a> {
    pub entry: &'a LegendEntry,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    legend: Vec<LegendEntry>,
    sampling: SamplingSettings,
}

impl Classifier {
    pub fn new(legend: Vec<LegendEntry>, sampling: SamplingSettings) -> Self {
        Classifier { legend, sampling }
    }

    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self::new(calibration.legend.clone(), calibration.sampling.clone())
    }

    pub fn radius(&self) -> u32 {
        self.sampling.radius
    }

    /// True for pixels that carry no radar echo at all.
    fn is_empty_pixel(&self, px: Rgba) -> bool {
        let brightness = (f64::from(px.r) + f64::from(px.g) + f64::from(px.b)) / 3.0;
        px.a < self.sampling.min_alpha || brightness < self.sampling.min_brightness
    }

    /// Nearest legend entry regardless of the cutoff. Ties go to the entry
    /// listed first.
    pub fn nearest(&self, px: Rgba) -> Option<ColorMatch<'_>> {
        let mut best: Option<ColorMatch<'_>> = None;
        for entry in &self.legend {
            let distance = entry.color.distance_to(px);
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(ColorMatch { entry, distance });
            }
        }
        best
    }

    pub fn classify_pixel(&self, px: Rgba) -> SeverityTier {
        if self.is_empty_pixel(px) {
            return SeverityTier::None;
        }
        match self.nearest(px) {
            Some(m) if m.distance <= self.sampling.max_color_distance => m.entry.tier,
            _ => SeverityTier::None,
        }
    }

    /// Pixels of the disk of `radius` around `center`, clamped to the image.
    pub fn neighborhood(&self, image: &RasterImage, center: (u32, u32)) -> Vec<Rgba> {
        let r = i64::from(self.sampling.radius);
        let max_x = i64::from(image.width()) - 1;
        let max_y = i64::from(image.height()) - 1;
        let (cx, cy) = (i64::from(center.0), i64::from(center.1));

        let mut pixels = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let x = (cx + dx).clamp(0, max_x) as u32;
                let y = (cy + dy).clamp(0, max_y) as u32;
                pixels.extend(image.pixel(x, y));
            }
        }
        pixels
    }

    /// Maximum tier found in the neighbourhood of `pixel`.
    pub fn classify(&self, image: &RasterImage, pixel: (u32, u32)) -> SeverityTier {
        self.neighborhood(image, pixel)
            .into_iter()
            .map(|px| self.classify_pixel(px))
            .max()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::HexColor;

    fn entry(hex: &str, tier: SeverityTier) -> LegendEntry {
        LegendEntry {
            color: hex.parse::<HexColor>().unwrap(),
            tier,
        }
    }

    /// Legend from the worked example: blue is light rain, red-orange is
    /// heavy, white background is explicitly nothing.
    fn example_classifier(radius: u32) -> Classifier {
        Classifier::new(
            vec![
                entry("#FFFFFF", SeverityTier::None),
                entry("#3399FF", SeverityTier::Light),
                entry("#FF3300", SeverityTier::Heavy),
            ],
            SamplingSettings {
                radius,
                max_color_distance: 60.0,
                ..SamplingSettings::default()
            },
        )
    }

    fn white_image() -> RasterImage {
        RasterImage::filled(241, 161, Rgba::opaque(255, 255, 255)).unwrap()
    }

    #[test]
    fn test_exact_legend_colours_map_to_their_tiers() {
        let c = example_classifier(0);
        assert_eq!(c.classify_pixel(Rgba::opaque(0x33, 0x99, 0xFF)), SeverityTier::Light);
        assert_eq!(c.classify_pixel(Rgba::opaque(0xFF, 0x33, 0x00)), SeverityTier::Heavy);
        assert_eq!(c.classify_pixel(Rgba::opaque(0xFF, 0xFF, 0xFF)), SeverityTier::None);
    }

    #[test]
    fn test_anti_aliased_shades_match_nearest_colour() {
        let c = example_classifier(0);
        assert_eq!(c.classify_pixel(Rgba::opaque(0x40, 0xA0, 0xF0)), SeverityTier::Light);
        assert_eq!(c.classify_pixel(Rgba::opaque(0xF5, 0xF5, 0xF2)), SeverityTier::None);
    }

    #[test]
    fn test_colours_beyond_cutoff_are_excluded() {
        let c = example_classifier(0);
        // Mid grey border: far from every legend entry.
        assert_eq!(c.classify_pixel(Rgba::opaque(128, 128, 128)), SeverityTier::None);
        // Pure green label text.
        assert_eq!(c.classify_pixel(Rgba::opaque(0, 255, 0)), SeverityTier::None);
    }

    #[test]
    fn test_transparent_and_black_pixels_are_empty() {
        let c = example_classifier(0);
        assert_eq!(
            c.classify_pixel(Rgba { r: 0xFF, g: 0x33, b: 0x00, a: 3 }),
            SeverityTier::None
        );
        assert_eq!(c.classify_pixel(Rgba::opaque(5, 5, 5)), SeverityTier::None);
    }

    #[test]
    fn test_neighbourhood_reports_maximum_tier() {
        let c = example_classifier(3);
        let mut image = white_image();
        image.set_pixel(121, 80, Rgba::opaque(0x33, 0x99, 0xFF));
        image.set_pixel(120, 82, Rgba::opaque(0xFF, 0x33, 0x00));
        assert_eq!(c.classify(&image, (120, 80)), SeverityTier::Heavy);
    }

    #[test]
    fn test_neighbourhood_is_a_disk_not_a_square() {
        let c = example_classifier(3);
        let mut image = white_image();
        // (3, 3) offset is outside a radius-3 disk.
        image.set_pixel(123, 83, Rgba::opaque(0xFF, 0x33, 0x00));
        assert_eq!(c.classify(&image, (120, 80)), SeverityTier::None);
        image.set_pixel(123, 80, Rgba::opaque(0xFF, 0x33, 0x00));
        assert_eq!(c.classify(&image, (120, 80)), SeverityTier::Heavy);
    }

    #[test]
    fn test_neighbourhood_clamps_at_image_edge() {
        let c = example_classifier(4);
        let mut image = white_image();
        image.set_pixel(0, 0, Rgba::opaque(0x33, 0x99, 0xFF));
        assert_eq!(c.neighborhood(&image, (0, 0)).len(), 49);
        assert_eq!(c.classify(&image, (0, 0)), SeverityTier::Light);
    }

    #[test]
    fn test_legend_order_breaks_distance_ties() {
        let c = Classifier::new(
            vec![
                entry("#000010", SeverityTier::Light),
                entry("#000030", SeverityTier::Heavy),
            ],
            SamplingSettings {
                min_brightness: 0.0,
                ..SamplingSettings::default()
            },
        );
        let m = c.nearest(Rgba::opaque(0, 0, 0x20)).unwrap();
        assert_eq!(m.entry.tier, SeverityTier::Light);
    }
}
