//! Raster painter backed by a CPU pixmap.

use easel_core::entity::{FillRuleKind, LineCap, LineJoin, StrokeStyle};
use easel_core::gradient::{Gradient, GradientKind};
use easel_core::loader::TextureData;
use easel_core::paint::Paint;
use easel_core::pattern::RepeatMode;
use easel_core::shadow::Shadow;
use easel_core::{parse_color, Rgba};
use kurbo::{Affine, BezPath, PathEl, Rect, Shape as _};
use tiny_skia::{
    BlendMode, Color, ColorU8, FillRule, GradientStop, LinearGradient, Pixmap, PixmapPaint,
    PathBuilder, Point, RadialGradient, SpreadMode, Stroke, StrokeDash, Transform,
};

use crate::blur::gaussian_blur;
use crate::error::{RenderError, RenderResult};
use crate::painter::{CompositeOp, Painter};

#[derive(Debug, Clone)]
struct PaintState {
    transform: Affine,
    alpha: f64,
    composite: CompositeOp,
    shadow: Option<Shadow>,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            composite: CompositeOp::SourceOver,
            shadow: None,
        }
    }
}

/// CPU raster backend.
pub struct PixmapPainter {
    pixmap: Pixmap,
    state: PaintState,
    stack: Vec<PaintState>,
}

#[allow(clippy::cast_possible_truncation)]
fn to_ts_transform(affine: Affine) -> Transform {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

fn blend_mode(op: CompositeOp) -> BlendMode {
    match op {
        CompositeOp::SourceOver => BlendMode::SourceOver,
        CompositeOp::DestinationIn => BlendMode::DestinationIn,
        CompositeOp::DestinationOut => BlendMode::DestinationOut,
        CompositeOp::DestinationOver => BlendMode::DestinationOver,
        CompositeOp::Copy => BlendMode::Source,
        CompositeOp::Multiply => BlendMode::Multiply,
        CompositeOp::Screen => BlendMode::Screen,
        CompositeOp::Overlay => BlendMode::Overlay,
        CompositeOp::Darken => BlendMode::Darken,
        CompositeOp::Lighten => BlendMode::Lighten,
        CompositeOp::Lighter => BlendMode::Plus,
        CompositeOp::Xor => BlendMode::Xor,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_ts_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match el {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => {
                builder.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32);
            }
            PathEl::CurveTo(c1, c2, p) => builder.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

#[allow(clippy::cast_possible_truncation)]
fn ts_color(rgba: Rgba, alpha: f64) -> Color {
    let a = f32::from(rgba.a) / 255.0 * alpha as f32;
    Color::from_rgba(
        f32::from(rgba.r) / 255.0,
        f32::from(rgba.g) / 255.0,
        f32::from(rgba.b) / 255.0,
        a.clamp(0.0, 1.0),
    )
    .unwrap_or(Color::BLACK)
}

/// Convert an unpremultiplied RGBA texture to a pixmap.
pub(crate) fn texture_to_pixmap(texture: &TextureData) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(texture.width, texture.height)?;
    for (pixel, chunk) in pixmap
        .pixels_mut()
        .iter_mut()
        .zip(texture.data.chunks_exact(4))
    {
        *pixel = ColorU8::from_rgba(chunk[0], chunk[1], chunk[2], chunk[3]).premultiply();
    }
    Some(pixmap)
}

#[allow(clippy::cast_possible_truncation)]
fn gradient_shader(gradient: &Gradient, object_bounds: Rect, alpha: f64) -> Option<tiny_skia::Shader<'static>> {
    let coords = gradient.resolved_coords(object_bounds);
    let stops: Vec<GradientStop> = gradient
        .stops
        .iter()
        .map(|stop| {
            let rgba = parse_color(&stop.color);
            let stop_alpha = alpha * stop.opacity.unwrap_or(1.0);
            GradientStop::new(stop.offset as f32, ts_color(rgba, stop_alpha))
        })
        .collect();
    let transform = gradient.transform.map_or_else(Transform::identity, to_ts_transform);
    match gradient.kind {
        GradientKind::Linear => LinearGradient::new(
            Point::from_xy(coords.x1 as f32, coords.y1 as f32),
            Point::from_xy(coords.x2 as f32, coords.y2 as f32),
            stops,
            SpreadMode::Pad,
            transform,
        ),
        GradientKind::Radial => RadialGradient::new(
            Point::from_xy(coords.x1 as f32, coords.y1 as f32),
            Point::from_xy(coords.x2 as f32, coords.y2 as f32),
            coords.r2 as f32,
            stops,
            SpreadMode::Pad,
            transform,
        ),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn make_stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.width as f32,
        miter_limit: style.miter_limit as f32,
        line_cap: match style.cap {
            LineCap::Butt => tiny_skia::LineCap::Butt,
            LineCap::Round => tiny_skia::LineCap::Round,
            LineCap::Square => tiny_skia::LineCap::Square,
        },
        line_join: match style.join {
            LineJoin::Miter => tiny_skia::LineJoin::Miter,
            LineJoin::Round => tiny_skia::LineJoin::Round,
            LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
        },
        dash: if style.dash_array.is_empty() {
            None
        } else {
            let array: Vec<f32> = style.dash_array.iter().map(|v| *v as f32).collect();
            StrokeDash::new(array, style.dash_offset as f32)
        },
    }
}

impl PixmapPainter {
    /// Create a painter over a transparent surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] for zero dimensions.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| RenderError::Surface(format!("invalid surface size {width}x{height}")))?;
        Ok(Self {
            pixmap,
            state: PaintState::default(),
            stack: Vec::new(),
        })
    }

    /// Wrap an existing surface, reusing its buffer.
    #[must_use]
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            state: PaintState::default(),
            stack: Vec::new(),
        }
    }

    /// Borrow the underlying pixmap.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Consume the painter, yielding the surface.
    #[must_use]
    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    #[allow(clippy::cast_possible_truncation)]
    fn ts_paint_for<'a>(
        &self,
        paint: &Paint,
        object_bounds: Rect,
        texture_pixmap: Option<&'a Pixmap>,
    ) -> Option<tiny_skia::Paint<'a>> {
        let mut ts_paint = tiny_skia::Paint {
            anti_alias: true,
            blend_mode: blend_mode(self.state.composite),
            ..tiny_skia::Paint::default()
        };
        match paint {
            Paint::None => return None,
            Paint::Color(c) => {
                ts_paint.set_color(ts_color(parse_color(c), self.state.alpha));
            }
            Paint::Gradient(g) => {
                ts_paint.shader = gradient_shader(g, object_bounds, self.state.alpha)?;
            }
            Paint::Pattern(p) => {
                let pixmap = texture_pixmap?;
                let spread = match p.repeat {
                    RepeatMode::NoRepeat => SpreadMode::Pad,
                    // Single-axis repeats degrade to full tiling.
                    RepeatMode::Repeat | RepeatMode::RepeatX | RepeatMode::RepeatY => {
                        SpreadMode::Repeat
                    }
                };
                let transform = p
                    .transform
                    .map_or_else(Transform::identity, to_ts_transform)
                    .post_translate(p.offset_x as f32, p.offset_y as f32);
                #[allow(clippy::cast_possible_truncation)]
                {
                    ts_paint.shader = tiny_skia::Pattern::new(
                        pixmap.as_ref(),
                        spread,
                        tiny_skia::FilterQuality::Bilinear,
                        self.state.alpha as f32,
                        transform,
                    );
                }
            }
        }
        Some(ts_paint)
    }

    fn pattern_pixmap(paint: &Paint) -> Option<Pixmap> {
        if let Paint::Pattern(p) = paint {
            p.texture.as_ref().and_then(texture_to_pixmap)
        } else {
            None
        }
    }

    /// Draw the blurred, offset silhouette of a path before the shape
    /// itself lands.
    fn draw_shadow_for_path(&mut self, path: &tiny_skia::Path, stroke: Option<&Stroke>) {
        let Some(shadow) = self.state.shadow.clone() else {
            return;
        };
        let Some(mut layer) = Pixmap::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        let color = parse_color(&shadow.color);
        let mut silhouette = tiny_skia::Paint {
            anti_alias: true,
            ..tiny_skia::Paint::default()
        };
        silhouette.set_color(ts_color(color, self.state.alpha));
        // Offsets are device-space; callers pre-scale them to the rendered
        // size of the object.
        let transform = to_ts_transform(
            Affine::translate((shadow.offset_x, shadow.offset_y)) * self.state.transform,
        );
        match stroke {
            Some(s) => layer.stroke_path(path, &silhouette, s, transform, None),
            None => layer.fill_path(path, &silhouette, FillRule::Winding, transform, None),
        }
        let width = layer.width() as usize;
        let height = layer.height() as usize;
        gaussian_blur(layer.data_mut(), width, height, shadow.blur / 2.0);
        self.pixmap.draw_pixmap(
            0,
            0,
            layer.as_ref(),
            &PixmapPaint {
                blend_mode: blend_mode(self.state.composite),
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
    }
}

impl Painter for PixmapPainter {
    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
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
        match color {
            Some(rgba) => self.pixmap.fill(ts_color(rgba, 1.0)),
            None => self.pixmap.fill(Color::TRANSPARENT),
        }
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint, object_bounds: Rect) {
        let path = rect.to_path(0.1);
        self.fill_path(&path, paint, FillRuleKind::NonZero, object_bounds);
    }

    fn fill_path(
        &mut self,
        path: &BezPath,
        paint: &Paint,
        rule: FillRuleKind,
        object_bounds: Rect,
    ) {
        let Some(ts_path) = to_ts_path(path) else {
            return;
        };
        let texture = Self::pattern_pixmap(paint);
        let Some(ts_paint) = self.ts_paint_for(paint, object_bounds, texture.as_ref()) else {
            return;
        };
        self.draw_shadow_for_path(&ts_path, None);
        let fill_rule = match rule {
            FillRuleKind::NonZero => FillRule::Winding,
            FillRuleKind::EvenOdd => FillRule::EvenOdd,
        };
        self.pixmap.fill_path(
            &ts_path,
            &ts_paint,
            fill_rule,
            to_ts_transform(self.state.transform),
            None,
        );
    }

    fn stroke_path(
        &mut self,
        path: &BezPath,
        paint: &Paint,
        style: &StrokeStyle,
        object_bounds: Rect,
    ) {
        let Some(ts_path) = to_ts_path(path) else {
            return;
        };
        let texture = Self::pattern_pixmap(paint);
        let Some(ts_paint) = self.ts_paint_for(paint, object_bounds, texture.as_ref()) else {
            return;
        };
        let stroke = make_stroke(style);
        let affects_stroke = self
            .state
            .shadow
            .as_ref()
            .is_some_and(|s| s.affect_stroke);
        if affects_stroke {
            self.draw_shadow_for_path(&ts_path, Some(&stroke));
        }
        self.pixmap.stroke_path(
            &ts_path,
            &ts_paint,
            &stroke,
            to_ts_transform(self.state.transform),
            None,
        );
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_texture(&mut self, texture: &TextureData, dst: Rect) {
        let Some(source) = texture_to_pixmap(texture) else {
            return;
        };
        if texture.width == 0 || texture.height == 0 {
            return;
        }
        let scale_x = dst.width() / f64::from(texture.width);
        let scale_y = dst.height() / f64::from(texture.height);
        let transform = self.state.transform
            * Affine::translate((dst.x0, dst.y0))
            * Affine::scale_non_uniform(scale_x, scale_y);
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint {
                opacity: self.state.alpha as f32,
                blend_mode: blend_mode(self.state.composite),
                quality: tiny_skia::FilterQuality::Bilinear,
            },
            to_ts_transform(transform),
            None,
        );
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_surface(&mut self, surface: &Pixmap, transform: Affine) {
        self.pixmap.draw_pixmap(
            0,
            0,
            surface.as_ref(),
            &PixmapPaint {
                opacity: self.state.alpha as f32,
                blend_mode: blend_mode(self.state.composite),
                quality: tiny_skia::FilterQuality::Bilinear,
            },
            to_ts_transform(self.state.transform * transform),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_at(painter: &PixmapPainter, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let pixel = painter.pixmap().pixel(x, y).expect("pixel");
        (pixel.red(), pixel.green(), pixel.blue(), pixel.alpha())
    }

    #[test]
    fn test_zero_size_surface_is_rejected() {
        assert!(matches!(
            PixmapPainter::new(0, 10),
            Err(RenderError::Surface(_))
        ));
    }

    #[test]
    fn test_fill_rect_with_color() {
        let mut painter = PixmapPainter::new(20, 20).expect("surface");
        painter.fill_rect(
            Rect::new(5.0, 5.0, 15.0, 15.0),
            &Paint::color("red"),
            Rect::new(0.0, 0.0, 20.0, 20.0),
        );
        assert_eq!(red_at(&painter, 10, 10), (255, 0, 0, 255));
        assert_eq!(red_at(&painter, 1, 1).3, 0);
    }

    #[test]
    fn test_transform_applies_to_fill() {
        let mut painter = PixmapPainter::new(20, 20).expect("surface");
        painter.set_transform(Affine::translate((10.0, 0.0)));
        painter.fill_rect(
            Rect::new(0.0, 0.0, 5.0, 5.0),
            &Paint::color("#00ff00"),
            Rect::new(0.0, 0.0, 5.0, 5.0),
        );
        assert_eq!(red_at(&painter, 12, 2), (0, 255, 0, 255));
        assert_eq!(red_at(&painter, 2, 2).3, 0);
    }

    #[test]
    fn test_alpha_scales_coverage() {
        let mut painter = PixmapPainter::new(10, 10).expect("surface");
        painter.set_alpha(0.5);
        painter.fill_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            &Paint::color("black"),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );
        let alpha = red_at(&painter, 5, 5).3;
        assert!(alpha > 100 && alpha < 155);
    }

    #[test]
    fn test_save_restore_round_trips_state() {
        let mut painter = PixmapPainter::new(10, 10).expect("surface");
        painter.set_alpha(0.25);
        painter.save();
        painter.set_alpha(1.0);
        painter.set_transform(Affine::scale(3.0));
        painter.restore();
        assert!((painter.state.alpha - 0.25).abs() < 1e-9);
        assert_eq!(painter.current_transform(), Affine::IDENTITY);
    }

    #[test]
    fn test_destination_in_masks() {
        let mut painter = PixmapPainter::new(10, 10).expect("surface");
        painter.fill_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            &Paint::color("blue"),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );
        painter.set_composite(CompositeOp::DestinationIn);
        painter.fill_rect(
            Rect::new(0.0, 0.0, 5.0, 10.0),
            &Paint::color("white"),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );
        assert_eq!(red_at(&painter, 2, 2).3, 255);
        assert_eq!(red_at(&painter, 8, 2).3, 0);
    }

    #[test]
    fn test_shadow_lands_offset_from_shape() {
        let mut painter = PixmapPainter::new(40, 40).expect("surface");
        painter.set_shadow(Some(Shadow {
            color: "black".to_string(),
            blur: 0.0,
            offset_x: 10.0,
            offset_y: 10.0,
            affect_stroke: false,
            non_scaling: false,
        }));
        painter.fill_rect(
            Rect::new(5.0, 5.0, 15.0, 15.0),
            &Paint::color("red"),
            Rect::new(5.0, 5.0, 15.0, 15.0),
        );
        // Shadow-only region: offset square minus the shape itself.
        assert_eq!(red_at(&painter, 22, 22), (0, 0, 0, 255));
        assert_eq!(red_at(&painter, 10, 10).0, 255);
    }

    #[test]
    fn test_gradient_fill_varies_across_bounds() {
        use easel_core::gradient::{ColorStop, GradientCoords};
        let gradient = Gradient::linear(
            GradientCoords {
                x1: 0.0,
                y1: 0.0,
                x2: 20.0,
                y2: 0.0,
                ..Default::default()
            },
            vec![
                ColorStop {
                    offset: 0.0,
                    color: "#000000".to_string(),
                    opacity: None,
                },
                ColorStop {
                    offset: 1.0,
                    color: "#ffffff".to_string(),
                    opacity: None,
                },
            ],
        );
        let mut painter = PixmapPainter::new(20, 20).expect("surface");
        painter.fill_rect(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            &Paint::Gradient(gradient),
            Rect::new(0.0, 0.0, 20.0, 20.0),
        );
        let left = red_at(&painter, 1, 10).0;
        let right = red_at(&painter, 18, 10).0;
        assert!(right > left);
    }
}
