//! Gradient paint source.
//!
//! Gradients carry declarative coordinates and color stops, serialize to and
//! from plain objects, and emit SVG `<linearGradient>`/`<radialGradient>`
//! definitions.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::matrix::to_svg_attribute;

static NEXT_SVG_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a process-unique SVG element id of the form `SVGID_<n>`.
#[must_use]
pub fn next_svg_id() -> String {
    let n = NEXT_SVG_ID.fetch_add(1, Ordering::Relaxed);
    format!("SVGID_{n}")
}

/// Linear or radial gradient geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    /// Straight-line gradient between two endpoints.
    Linear,
    /// Concentric gradient between two circles.
    Radial,
}

/// Coordinate system the gradient coordinates are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientUnits {
    /// Absolute pixels in object space.
    Pixels,
    /// Fractions of the object bounding box.
    Percentage,
}

/// One color stop along a gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Position along the gradient in `[0, 1]`.
    pub offset: f64,
    /// Stop color as a CSS color string.
    pub color: String,
    /// Optional stop opacity multiplied into the color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// Gradient endpoint coordinates; radii apply to radial gradients only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GradientCoords {
    /// Start x.
    pub x1: f64,
    /// Start y.
    pub y1: f64,
    /// End x.
    pub x2: f64,
    /// End y.
    pub y2: f64,
    /// Inner radius (radial only).
    #[serde(default)]
    pub r1: f64,
    /// Outer radius (radial only).
    #[serde(default)]
    pub r2: f64,
}

/// A declarative gradient paint source.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// Linear or radial.
    pub kind: GradientKind,
    /// Endpoint coordinates.
    pub coords: GradientCoords,
    /// Ordered color stops.
    pub stops: Vec<ColorStop>,
    /// Unit system for `coords`.
    pub units: GradientUnits,
    /// Optional extra transform applied to the gradient geometry.
    pub transform: Option<Affine>,
    /// Horizontal offset added to the resolved coordinates.
    pub offset_x: f64,
    /// Vertical offset added to the resolved coordinates.
    pub offset_y: f64,
    /// Unique id used for SVG `<defs>` references.
    pub id: String,
}

impl Gradient {
    /// Create a linear gradient in pixel units.
    #[must_use]
    pub fn linear(coords: GradientCoords, stops: Vec<ColorStop>) -> Self {
        Self {
            kind: GradientKind::Linear,
            coords,
            stops,
            units: GradientUnits::Pixels,
            transform: None,
            offset_x: 0.0,
            offset_y: 0.0,
            id: next_svg_id(),
        }
    }

    /// Create a radial gradient in pixel units.
    #[must_use]
    pub fn radial(coords: GradientCoords, stops: Vec<ColorStop>) -> Self {
        Self {
            kind: GradientKind::Radial,
            ..Self::linear(coords, stops)
        }
    }

    /// Resolve the coordinates to absolute object-space pixels.
    ///
    /// Percentage units are interpreted as fractions of the object bounding
    /// box; offsets are applied afterwards in pixels.
    #[must_use]
    pub fn resolved_coords(&self, object_bounds: Rect) -> GradientCoords {
        let mut c = self.coords;
        if self.units == GradientUnits::Percentage {
            let w = object_bounds.width();
            let h = object_bounds.height();
            c.x1 *= w;
            c.x2 *= w;
            c.y1 *= h;
            c.y2 *= h;
            let diag = (w * w + h * h).sqrt() / std::f64::consts::SQRT_2;
            c.r1 *= diag;
            c.r2 *= diag;
        }
        c.x1 += self.offset_x;
        c.x2 += self.offset_x;
        c.y1 += self.offset_y;
        c.y2 += self.offset_y;
        c
    }

    /// Serialize to a plain object.
    #[must_use]
    pub fn to_object(&self) -> Value {
        let mut map = serde_json::Map::new();
        let kind = match self.kind {
            GradientKind::Linear => "linear",
            GradientKind::Radial => "radial",
        };
        map.insert("type".to_string(), Value::from(kind));
        map.insert(
            "coords".to_string(),
            serde_json::to_value(self.coords).unwrap_or(Value::Null),
        );
        map.insert(
            "colorStops".to_string(),
            serde_json::to_value(&self.stops).unwrap_or(Value::Null),
        );
        let units = match self.units {
            GradientUnits::Pixels => "pixels",
            GradientUnits::Percentage => "percentage",
        };
        map.insert("gradientUnits".to_string(), Value::from(units));
        if let Some(t) = self.transform {
            map.insert(
                "gradientTransform".to_string(),
                Value::from(t.as_coeffs().to_vec()),
            );
        }
        if self.offset_x != 0.0 || self.offset_y != 0.0 {
            map.insert("offsetX".to_string(), Value::from(self.offset_x));
            map.insert("offsetY".to_string(), Value::from(self.offset_y));
        }
        Value::Object(map)
    }

    /// Reconstruct a gradient from a plain object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] when required fields are
    /// missing or of the wrong shape.
    pub fn from_object(value: &Value) -> CoreResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::MalformedInput("gradient must be an object".to_string()))?;
        let kind = match obj.get("type").and_then(Value::as_str) {
            Some("radial") => GradientKind::Radial,
            _ => GradientKind::Linear,
        };
        let coords = obj
            .get("coords")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        let stops: Vec<ColorStop> = obj
            .get("colorStops")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .ok_or_else(|| CoreError::MalformedInput("gradient without colorStops".to_string()))?;
        let units = match obj.get("gradientUnits").and_then(Value::as_str) {
            Some("percentage") => GradientUnits::Percentage,
            _ => GradientUnits::Pixels,
        };
        let transform = match obj.get("gradientTransform") {
            Some(v) => {
                let coeffs: Vec<f64> = serde_json::from_value(v.clone())?;
                let arr: [f64; 6] = coeffs.try_into().map_err(|_| {
                    CoreError::MalformedInput("gradientTransform must have 6 entries".to_string())
                })?;
                Some(Affine::new(arr))
            }
            None => None,
        };
        let offset_x = obj.get("offsetX").and_then(Value::as_f64).unwrap_or(0.0);
        let offset_y = obj.get("offsetY").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(Self {
            kind,
            coords,
            stops,
            units,
            transform,
            offset_x,
            offset_y,
            id: next_svg_id(),
        })
    }

    /// Emit SVG markup for this gradient definition.
    #[must_use]
    pub fn to_svg(&self, object_bounds: Rect) -> String {
        let c = self.resolved_coords(object_bounds);
        let mut svg = String::new();
        let transform_attr = self
            .transform
            .map(|t| format!(" gradientTransform=\"{}\"", to_svg_attribute(t, 6)))
            .unwrap_or_default();
        match self.kind {
            GradientKind::Linear => {
                let _ = write!(
                    svg,
                    "<linearGradient id=\"{}\" gradientUnits=\"userSpaceOnUse\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\"{}>",
                    self.id, c.x1, c.y1, c.x2, c.y2, transform_attr,
                );
            }
            GradientKind::Radial => {
                let _ = write!(
                    svg,
                    "<radialGradient id=\"{}\" gradientUnits=\"userSpaceOnUse\" cx=\"{}\" cy=\"{}\" r=\"{}\" fx=\"{}\" fy=\"{}\"{}>",
                    self.id, c.x2, c.y2, c.r2, c.x1, c.y1, transform_attr,
                );
            }
        }
        for stop in &self.stops {
            let opacity = stop
                .opacity
                .map(|o| format!(" stop-opacity=\"{o}\""))
                .unwrap_or_default();
            let _ = write!(
                svg,
                "<stop offset=\"{}\" stop-color=\"{}\"{}/>",
                stop.offset, stop.color, opacity,
            );
        }
        match self.kind {
            GradientKind::Linear => svg.push_str("</linearGradient>"),
            GradientKind::Radial => svg.push_str("</radialGradient>"),
        }
        svg
    }
}
