//! Shared rendering configuration.
//!
//! Core algorithms (cache sizing, serialization rounding, scale clamping)
//! take a [`RenderConfig`] as a parameter instead of reading process-wide
//! state, so they stay independently testable. [`RenderConfig::default`] is
//! meant to be constructed once at the composition root.

use std::collections::HashMap;

/// Configuration shared by entity construction, serialization, and rendering.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Number of fraction digits kept when serializing numeric properties.
    pub num_fraction_digits: u32,
    /// Minimum side length of a cache bitmap, in pixels.
    pub min_cache_side_limit: u32,
    /// Maximum side length of a cache bitmap, in pixels.
    pub max_cache_side_limit: u32,
    /// Maximum total pixel count of a cache bitmap.
    pub perf_limit_size_total: u32,
    /// Scale magnitudes below this are clamped up to it (sign preserved).
    pub min_scale_limit: f64,
    /// Device pixel ratio applied when retina scaling is enabled.
    pub device_pixel_ratio: f64,
    /// Whether cache bitmaps account for the device pixel ratio.
    pub enable_retina_scaling: bool,
    /// Whether entities without a structural need may still be cached.
    pub object_caching: bool,
    /// Whether top-level entities outside the viewport are skipped.
    pub skip_offscreen: bool,
    /// Font-family to font-file URL map, consumed during SVG font-face
    /// emission.
    pub font_paths: HashMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            num_fraction_digits: 2,
            min_cache_side_limit: 256,
            max_cache_side_limit: 4096,
            perf_limit_size_total: 2_097_152,
            min_scale_limit: 0.0,
            device_pixel_ratio: 1.0,
            enable_retina_scaling: true,
            object_caching: true,
            skip_offscreen: true,
            font_paths: HashMap::new(),
        }
    }
}

impl RenderConfig {
    /// The effective zoom factor contributed by device scaling.
    #[must_use]
    pub fn retina_scaling(&self) -> f64 {
        if self.enable_retina_scaling {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }

    /// Round `value` to the configured number of fraction digits.
    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10_f64.powi(i32::try_from(self.num_fraction_digits.min(12)).unwrap_or(12));
        (value * factor).round() / factor
    }
}

#[cfg(test)]
mod tests {
    use super::RenderConfig;

    #[test]
    fn test_round_uses_fraction_digits() {
        let config = RenderConfig {
            num_fraction_digits: 2,
            ..Default::default()
        };
        assert!((config.round(1.005_4) - 1.01).abs() < 1e-9);
        assert!((config.round(-0.333_33) - -0.33).abs() < 1e-9);
    }

    #[test]
    fn test_retina_scaling_flag() {
        let mut config = RenderConfig {
            device_pixel_ratio: 2.0,
            ..Default::default()
        };
        assert!((config.retina_scaling() - 2.0).abs() < f64::EPSILON);
        config.enable_retina_scaling = false;
        assert!((config.retina_scaling() - 1.0).abs() < f64::EPSILON);
    }
}
