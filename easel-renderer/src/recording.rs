//! Recording painter for pipeline inspection.
//!
//! Logs every drawing call instead of rasterizing, so tests can assert on
//! render pass ordering and the state surrounding each draw.

use easel_core::entity::{FillRuleKind, StrokeStyle};
use easel_core::loader::TextureData;
use easel_core::paint::Paint;
use easel_core::shadow::Shadow;
use easel_core::Rgba;
use kurbo::{Affine, BezPath, Rect};

use crate::painter::{CompositeOp, Painter};

/// One recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    /// Surface reset.
    Clear {
        /// Fill color, when opaque clearing was requested.
        color: Option<Rgba>,
    },
    /// Rectangle fill.
    FillRect {
        /// Target rectangle.
        rect: Rect,
        /// Paint used.
        paint: Paint,
        /// Alpha in effect.
        alpha: f64,
        /// Composite operation in effect.
        composite: CompositeOp,
    },
    /// Path fill.
    FillPath {
        /// Number of path elements.
        elements: usize,
        /// Paint used.
        paint: Paint,
        /// Alpha in effect.
        alpha: f64,
        /// Composite operation in effect.
        composite: CompositeOp,
        /// Transform in effect.
        transform: Affine,
    },
    /// Path stroke.
    StrokePath {
        /// Number of path elements.
        elements: usize,
        /// Stroke width.
        width: f64,
        /// Alpha in effect.
        alpha: f64,
    },
    /// Texture draw.
    DrawTexture {
        /// Destination rectangle.
        dst: Rect,
    },
    /// Prepared-surface composite (cache draw).
    DrawSurface {
        /// Surface width.
        width: u32,
        /// Surface height.
        height: u32,
        /// Alpha in effect.
        alpha: f64,
    },
}

#[derive(Debug, Clone)]
struct RecordState {
    transform: Affine,
    alpha: f64,
    composite: CompositeOp,
    shadow: Option<Shadow>,
}

impl Default for RecordState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            composite: CompositeOp::SourceOver,
            shadow: None,
        }
    }
}

/// Painter that records calls instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingPainter {
    width: u32,
    height: u32,
    state: RecordState,
    stack: Vec<RecordState>,
    ops: Vec<RecordedOp>,
}

impl RecordingPainter {
    /// Create a recorder reporting the given surface size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// The recorded calls, in draw order.
    #[must_use]
    pub fn ops(&self) -> &[RecordedOp] {
        &self.ops
    }

    /// Take the recorded calls, leaving the log empty.
    pub fn take_ops(&mut self) -> Vec<RecordedOp> {
        std::mem::take(&mut self.ops)
    }
}

impl Painter for RecordingPainter {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn set_transform(&mut self, transform: Affine) {
        self.state.transform = transform;
    }

    fn concat_transform(&mut self, transform: Affine) {
        self.state.transform *= transform;
    }

    fn current_transform(&self) -> Affine {
        self.state.transform
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn current_alpha(&self) -> f64 {
        self.state.alpha
    }

    fn set_composite(&mut self, op: CompositeOp) {
        self.state.composite = op;
    }

    fn set_shadow(&mut self, shadow: Option<Shadow>) {
        self.state.shadow = shadow;
    }

    fn clear(&mut self, color: Option<Rgba>) {
        self.ops.push(RecordedOp::Clear { color });
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint, _object_bounds: Rect) {
        self.ops.push(RecordedOp::FillRect {
            rect,
            paint: paint.clone(),
            alpha: self.state.alpha,
            composite: self.state.composite,
        });
    }

    fn fill_path(
        &mut self,
        path: &BezPath,
        paint: &Paint,
        _rule: FillRuleKind,
        _object_bounds: Rect,
    ) {
        self.ops.push(RecordedOp::FillPath {
            elements: path.elements().len(),
            paint: paint.clone(),
            alpha: self.state.alpha,
            composite: self.state.composite,
            transform: self.state.transform,
        });
    }

    fn stroke_path(
        &mut self,
        path: &BezPath,
        _paint: &Paint,
        style: &StrokeStyle,
        _object_bounds: Rect,
    ) {
        self.ops.push(RecordedOp::StrokePath {
            elements: path.elements().len(),
            width: style.width,
            alpha: self.state.alpha,
        });
    }

    fn draw_texture(&mut self, _texture: &TextureData, dst: Rect) {
        self.ops.push(RecordedOp::DrawTexture { dst });
    }

    fn draw_surface(&mut self, surface: &tiny_skia::Pixmap, _transform: Affine) {
        self.ops.push(RecordedOp::DrawSurface {
            width: surface.width(),
            height: surface.height(),
            alpha: self.state.alpha,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut painter = RecordingPainter::new(100, 100);
        painter.clear(None);
        painter.set_alpha(0.5);
        painter.fill_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            &Paint::color("red"),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );
        let ops = painter.ops();
        assert!(matches!(ops[0], RecordedOp::Clear { color: None }));
        assert!(matches!(
            ops[1],
            RecordedOp::FillRect { alpha, .. } if (alpha - 0.5).abs() < 1e-9
        ));
    }

    #[test]
    fn test_restore_rewinds_state_not_log() {
        let mut painter = RecordingPainter::new(10, 10);
        painter.save();
        painter.set_composite(CompositeOp::Multiply);
        painter.restore();
        painter.fill_rect(
            Rect::new(0.0, 0.0, 1.0, 1.0),
            &Paint::color("red"),
            Rect::new(0.0, 0.0, 1.0, 1.0),
        );
        assert!(matches!(
            painter.ops()[0],
            RecordedOp::FillRect {
                composite: CompositeOp::SourceOver,
                ..
            }
        ));
    }
}
