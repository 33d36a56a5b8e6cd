//! The painter abstraction backends implement.
//!
//! The compositor drives a [`Painter`] through a canvas-style stateful
//! protocol: a save/restore stack carrying transform, alpha, composite
//! operation, and shadow, plus fill/stroke/texture drawing calls. The
//! raster backend rasterizes; the recording backend logs calls for
//! pipeline inspection.

use easel_core::entity::{FillRuleKind, StrokeStyle};
use easel_core::loader::TextureData;
use easel_core::paint::Paint;
use easel_core::shadow::Shadow;
use easel_core::Rgba;
use kurbo::{Affine, BezPath, Rect};

/// Composite operation applied when source pixels land on the surface.
///
/// Names follow the canvas `globalCompositeOperation` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Source over destination.
    #[default]
    SourceOver,
    /// Keep destination where the source is opaque.
    DestinationIn,
    /// Keep destination where the source is transparent.
    DestinationOut,
    /// Source drawn behind the destination.
    DestinationOver,
    /// Replace the destination.
    Copy,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
    /// Overlay blend.
    Overlay,
    /// Darken blend.
    Darken,
    /// Lighten blend.
    Lighten,
    /// Additive blend.
    Lighter,
    /// Exclusive-or of source and destination coverage.
    Xor,
}

impl CompositeOp {
    /// Parse a canvas composite-operation name; unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "source-over" => Some(Self::SourceOver),
            "destination-in" => Some(Self::DestinationIn),
            "destination-out" => Some(Self::DestinationOut),
            "destination-over" => Some(Self::DestinationOver),
            "copy" => Some(Self::Copy),
            "multiply" => Some(Self::Multiply),
            "screen" => Some(Self::Screen),
            "overlay" => Some(Self::Overlay),
            "darken" => Some(Self::Darken),
            "lighten" => Some(Self::Lighten),
            "lighter" => Some(Self::Lighter),
            "xor" => Some(Self::Xor),
            _ => None,
        }
    }
}

/// A drawing backend the compositor renders through.
pub trait Painter {
    /// Surface width in physical pixels.
    fn width(&self) -> u32;

    /// Surface height in physical pixels.
    fn height(&self) -> u32;

    /// Push the current drawing state.
    fn save(&mut self);

    /// Pop the drawing state; a pop without a matching push is ignored.
    fn restore(&mut self);

    /// Replace the current transform.
    fn set_transform(&mut self, transform: Affine);

    /// Multiply a transform onto the current one.
    fn concat_transform(&mut self, transform: Affine);

    /// The current transform.
    fn current_transform(&self) -> Affine;

    /// Set the global alpha for subsequent draws.
    fn set_alpha(&mut self, alpha: f64);

    /// The global alpha currently in effect.
    fn current_alpha(&self) -> f64;

    /// Set the composite operation for subsequent draws.
    fn set_composite(&mut self, op: CompositeOp);

    /// Set or clear the shadow applied to subsequent draws.
    fn set_shadow(&mut self, shadow: Option<Shadow>);

    /// Reset the whole surface, optionally to a solid color.
    fn clear(&mut self, color: Option<Rgba>);

    /// Fill an axis-aligned rectangle.
    ///
    /// `object_bounds` resolves percentage-unit gradient coordinates.
    fn fill_rect(&mut self, rect: Rect, paint: &Paint, object_bounds: Rect);

    /// Fill a path.
    fn fill_path(&mut self, path: &BezPath, paint: &Paint, rule: FillRuleKind, object_bounds: Rect);

    /// Stroke a path.
    fn stroke_path(
        &mut self,
        path: &BezPath,
        paint: &Paint,
        style: &StrokeStyle,
        object_bounds: Rect,
    );

    /// Draw a decoded texture into a destination rectangle.
    fn draw_texture(&mut self, texture: &TextureData, dst: Rect);

    /// Composite a prepared surface (an entity cache) with the given
    /// transform, in addition to the current one.
    fn draw_surface(&mut self, surface: &tiny_skia::Pixmap, transform: Affine);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_op_names() {
        assert_eq!(
            CompositeOp::from_name("source-over"),
            Some(CompositeOp::SourceOver)
        );
        assert_eq!(
            CompositeOp::from_name("destination-out"),
            Some(CompositeOp::DestinationOut)
        );
        assert_eq!(CompositeOp::from_name("hue"), None);
    }
}
