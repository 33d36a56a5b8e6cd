//! Per-entity drawing.
//!
//! [`render_entity`] implements the drawing contract for one scene node:
//! visibility and offscreen checks, composite operation, own transform,
//! opacity multiplied down the group chain, scaled shadow, and the choice
//! between compositing a cache bitmap and painting directly.

use easel_core::config::RenderConfig;
use easel_core::entity::{Entity, EntityKind, PaintFirst, StrokeStyle};
use easel_core::matrix::total_scale;
use easel_core::paint::Paint;
use easel_core::shapes::local_path;
use kurbo::{Affine, Rect};
use tracing::warn;

use crate::cache::CacheManager;
use crate::error::RenderResult;
use crate::painter::{CompositeOp, Painter};

/// Render one entity through the given painter.
///
/// `viewport_bounds` is the scene-space visible rectangle; entities wholly
/// outside it are skipped when offscreen skipping is enabled. Pass `None`
/// for nested draws, which are never culled individually.
///
/// # Errors
///
/// Propagates cache allocation failures.
pub fn render_entity<P: Painter>(
    painter: &mut P,
    entity: &mut Entity,
    cache: &mut CacheManager,
    config: &RenderConfig,
    viewport_bounds: Option<Rect>,
    parent_opacity: f64,
) -> RenderResult<()> {
    if !entity.is_visible() {
        return Ok(());
    }
    if let Some(bounds) = viewport_bounds {
        if config.skip_offscreen && !entity.is_on_screen(bounds) {
            return Ok(());
        }
    }
    painter.save();
    if let Some(op) = CompositeOp::from_name(&entity.global_composite_operation) {
        painter.set_composite(op);
    } else {
        warn!(
            operation = %entity.global_composite_operation,
            "unknown composite operation, using source-over"
        );
    }
    painter.set_alpha(parent_opacity * entity.opacity);
    if let Some(shadow) = &entity.shadow {
        let (sx, sy) = total_scale(painter.current_transform() * entity.own_matrix());
        painter.set_shadow(Some(shadow.scaled(sx, sy)));
    }
    painter.concat_transform(entity.own_matrix());
    let result = if CacheManager::should_cache(entity, config, false) {
        draw_through_cache(painter, entity, cache, config)
    } else {
        draw_entity_content(painter, entity, cache, config)
    };
    painter.restore();
    result
}

/// Composite the entity's cache bitmap at its local origin.
fn draw_through_cache<P: Painter>(
    painter: &mut P,
    entity: &mut Entity,
    cache: &mut CacheManager,
    config: &RenderConfig,
) -> RenderResult<()> {
    cache.render_cache(entity, config)?;
    // The cache bakes the shadow in; compositing must not add another.
    painter.set_shadow(None);
    if let Some((pixmap, placement)) = cache.placement(entity.id) {
        let to_local = Affine::scale_non_uniform(
            1.0 / placement.zoom_x.max(f64::EPSILON),
            1.0 / placement.zoom_y.max(f64::EPSILON),
        ) * Affine::translate((-placement.center_x, -placement.center_y));
        painter.draw_surface(pixmap, to_local);
    }
    Ok(())
}

/// Effective stroke style under the current transform.
///
/// A uniform stroke keeps constant on-screen width, so the declared width
/// is divided by the scale the transform will apply.
fn effective_stroke(entity: &Entity, transform: Affine) -> StrokeStyle {
    let mut style = entity.stroke_style();
    if style.uniform {
        let (sx, sy) = total_scale(transform);
        let mean = ((sx + sy) / 2.0).max(f64::EPSILON);
        style.width /= mean;
    }
    style
}

/// Paint the entity's content in its centered local space.
///
/// The painter transform must already map local coordinates to the target
/// surface. Group children draw directly here, except children that
/// structurally need their own surface (a clip path, or a shadow with the
/// stroke painted under the fill), which route through the cache manager.
///
/// # Errors
///
/// Propagates cache allocation failures from nested draws.
pub fn draw_entity_content<P: Painter>(
    painter: &mut P,
    entity: &mut Entity,
    cache: &mut CacheManager,
    config: &RenderConfig,
) -> RenderResult<()> {
    let bounds = entity.local_bounds();
    if !entity.background_color.is_empty() {
        painter.fill_rect(bounds, &Paint::color(&entity.background_color), bounds);
    }
    if let EntityKind::Group { children } = &mut entity.kind {
        for child in children {
            if !child.is_visible() {
                continue;
            }
            painter.save();
            if let Some(op) = CompositeOp::from_name(&child.global_composite_operation) {
                painter.set_composite(op);
            }
            painter.set_alpha(painter.current_alpha() * child.opacity);
            if let Some(shadow) = &child.shadow {
                let (sx, sy) = total_scale(painter.current_transform() * child.own_matrix());
                painter.set_shadow(Some(shadow.scaled(sx, sy)));
            }
            painter.concat_transform(child.own_matrix());
            let result = if CacheManager::should_cache(child, config, true) {
                draw_through_cache(painter, child, cache, config)
            } else {
                draw_entity_content(painter, child, cache, config)
            };
            painter.restore();
            result?;
        }
        return Ok(());
    }
    match &entity.kind {
        EntityKind::Image { texture, .. } => {
            let dst = Rect::new(
                -entity.width / 2.0,
                -entity.height / 2.0,
                entity.width / 2.0,
                entity.height / 2.0,
            );
            match texture {
                Some(t) => painter.draw_texture(t, dst),
                // Not an error: an unhydrated image renders as empty space.
                None => warn!("image entity has no texture, skipping paint"),
            }
            if !entity.stroke.is_none() && entity.stroke_width > 0.0 {
                if let Some(path) = local_path(entity) {
                    let style = effective_stroke(entity, painter.current_transform());
                    painter.stroke_path(&path, &entity.stroke, &style, bounds);
                }
            }
        }
        // Handled by the early return above.
        EntityKind::Group { .. } => {}
        // Text layout is out of scope for raster backends; text renders in
        // SVG export only.
        EntityKind::Text { .. } => {}
        EntityKind::Rect { .. } | EntityKind::Ellipse | EntityKind::Path { .. } => {
            if let Some(path) = local_path(entity) {
                let fill_pass = |painter: &mut P| {
                    if !entity.fill.is_none() {
                        painter.fill_path(&path, &entity.fill, entity.fill_rule, bounds);
                    }
                };
                let stroke_pass = |painter: &mut P| {
                    if !entity.stroke.is_none() && entity.stroke_width > 0.0 {
                        let style = effective_stroke(entity, painter.current_transform());
                        painter.stroke_path(&path, &entity.stroke, &style, bounds);
                    }
                };
                match entity.paint_first {
                    PaintFirst::Fill => {
                        fill_pass(painter);
                        stroke_pass(painter);
                    }
                    PaintFirst::Stroke => {
                        stroke_pass(painter);
                        fill_pass(painter);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::entity::Prop;
    use easel_core::shapes;
    use crate::recording::{RecordedOp, RecordingPainter};

    fn no_cache_config() -> RenderConfig {
        RenderConfig {
            object_caching: false,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_invisible_entity_draws_nothing() {
        let cfg = no_cache_config();
        let mut painter = RecordingPainter::new(100, 100);
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.visible = false;
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, None, 1.0).expect("render");
        assert!(painter.ops().is_empty());
    }

    #[test]
    fn test_offscreen_entity_is_culled_top_level_only() {
        let cfg = no_cache_config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(1000.0, 1000.0, 10.0, 10.0);
        let viewport = Rect::new(0.0, 0.0, 100.0, 100.0);

        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, Some(viewport), 1.0)
            .expect("render");
        assert!(painter.ops().is_empty());

        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, None, 1.0).expect("render");
        assert!(!painter.ops().is_empty());
    }

    #[test]
    fn test_opacity_multiplies_down_the_chain() {
        let cfg = no_cache_config();
        let mut cache = CacheManager::new();
        let mut child = shapes::rect(0.0, 0.0, 10.0, 10.0);
        child.opacity = 0.5;
        let mut group = shapes::group(vec![child], 0.0, 0.0, 20.0, 20.0);
        group.opacity = 0.5;
        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut group, &mut cache, &cfg, None, 0.8).expect("render");
        let Some(RecordedOp::FillPath { alpha, .. }) = painter
            .ops()
            .iter()
            .find(|op| matches!(op, RecordedOp::FillPath { .. }))
        else {
            panic!("no fill");
        };
        // 0.8 parent x 0.5 group x 0.5 child.
        assert!((alpha - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_paint_order_stroke_first() {
        let cfg = no_cache_config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.set(Prop::Stroke(Paint::color("black")), &cfg);
        rect.set(Prop::PaintFirst(PaintFirst::Stroke), &cfg);
        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, None, 1.0).expect("render");
        let ops = painter.ops();
        assert!(matches!(ops[0], RecordedOp::StrokePath { .. }));
        assert!(matches!(ops[1], RecordedOp::FillPath { .. }));
    }

    #[test]
    fn test_group_child_clip_routes_through_own_surface() {
        use easel_core::entity::ClipPath;
        let cfg = no_cache_config();
        let mut cache = CacheManager::new();
        let mut child = shapes::rect(0.0, 0.0, 10.0, 10.0);
        child.clip_path = Some(ClipPath {
            entity: Box::new(shapes::rect(-5.0, -5.0, 5.0, 10.0)),
            inverted: false,
            absolute_positioned: false,
        });
        let mut group = shapes::group(vec![child], 0.0, 0.0, 20.0, 20.0);
        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut group, &mut cache, &cfg, None, 1.0).expect("render");
        // The clipped child must composite as a masked surface, not a
        // direct fill.
        assert!(painter
            .ops()
            .iter()
            .any(|op| matches!(op, RecordedOp::DrawSurface { .. })));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cached_entity_composites_surface() {
        let cfg = RenderConfig::default();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, None, 1.0).expect("render");
        assert!(painter
            .ops()
            .iter()
            .any(|op| matches!(op, RecordedOp::DrawSurface { .. })));
    }

    #[test]
    fn test_uniform_stroke_counters_scale() {
        let cfg = no_cache_config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.set(Prop::Stroke(Paint::color("black")), &cfg);
        rect.set(Prop::StrokeWidth(4.0), &cfg);
        rect.set(Prop::StrokeUniform(true), &cfg);
        rect.set(Prop::ScaleX(2.0), &cfg);
        rect.set(Prop::ScaleY(2.0), &cfg);
        let mut painter = RecordingPainter::new(100, 100);
        render_entity(&mut painter, &mut rect, &mut cache, &cfg, None, 1.0).expect("render");
        let Some(RecordedOp::StrokePath { width, .. }) = painter
            .ops()
            .iter()
            .find(|op| matches!(op, RecordedOp::StrokePath { .. }))
        else {
            panic!("no stroke");
        };
        assert!((width - 2.0).abs() < 1e-9);
    }
}
