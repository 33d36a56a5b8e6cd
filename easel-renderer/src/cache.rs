//! Per-entity bitmap caches.
//!
//! Entities render into offscreen pixmaps so unchanged content composites
//! as a single blit. Entries move through absent → dirty → clean: a
//! cache-affecting property change flags the entity dirty, the next render
//! pass redraws its cache, and everything else reuses the existing bitmap.

use std::collections::HashMap;

use easel_core::config::RenderConfig;
use easel_core::entity::{Entity, EntityKind, PaintFirst};
use easel_core::matrix::{invert, total_scale};
use kurbo::Affine;
use tiny_skia::{BlendMode, Color, Pixmap, PixmapPaint, Transform};
use tracing::debug;
use uuid::Uuid;

use crate::draw::draw_entity_content;
use crate::error::{RenderError, RenderResult};
use crate::painter::Painter;
use crate::pixmap::PixmapPainter;

/// Extra pixels on each axis so anti-aliased edges are not clipped.
const ALIASING_MARGIN: f64 = 2.0;

/// Shrink only when the needed size falls below this share of the buffer.
const SHRINK_THRESHOLD: f64 = 0.9;

/// Padding applied when reallocating, so small growth reuses the buffer.
const GROWTH_PADDING: f64 = 1.1;

/// Cache usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Renders served from a clean cache.
    pub hits: u64,
    /// Renders that had to redraw the cache.
    pub misses: u64,
    /// Buffer allocations, initial and resizing.
    pub reallocations: u64,
}

/// Resolved cache bitmap dimensions and the zoom baked into them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSizing {
    /// Bitmap width in pixels.
    pub width: u32,
    /// Bitmap height in pixels.
    pub height: u32,
    /// Horizontal device pixels per logical unit.
    pub zoom_x: f64,
    /// Vertical device pixels per logical unit.
    pub zoom_y: f64,
    /// Whether a side or area limit reduced the zoom.
    pub capped: bool,
}

/// Where a cache bitmap sits relative to entity-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePlacement {
    /// Horizontal zoom baked into the bitmap.
    pub zoom_x: f64,
    /// Vertical zoom baked into the bitmap.
    pub zoom_y: f64,
    /// Bitmap x of the entity-local origin, whole pixels.
    pub center_x: f64,
    /// Bitmap y of the entity-local origin, whole pixels.
    pub center_y: f64,
}

#[derive(Debug)]
struct CacheEntry {
    pixmap: Pixmap,
    placement: CachePlacement,
    dirty: bool,
}

/// Manager of per-entity cache bitmaps, keyed by entity id.
#[derive(Debug, Default)]
pub struct CacheManager {
    entries: HashMap<Uuid, CacheEntry>,
    stats: CacheStats,
}

impl CacheManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of live cache entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entity is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entity should render through a cache.
    ///
    /// A clip path, or a stroke-under-fill paint order that carries a
    /// shadow over both fill and stroke, needs an intermediate surface
    /// regardless of configuration. Otherwise caching follows the global
    /// flag, except inside an enclosing group cache where the group bitmap
    /// already covers the children.
    #[must_use]
    pub fn should_cache(entity: &Entity, config: &RenderConfig, inside_group_cache: bool) -> bool {
        let structural = entity.clip_path.is_some()
            || (entity.shadow.is_some()
                && entity.paint_first == PaintFirst::Stroke
                && !entity.fill.is_none()
                && !entity.stroke.is_none());
        structural || (config.object_caching && !inside_group_cache)
    }

    /// Resolve cache bitmap dimensions for an entity.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn cache_dimensions(entity: &Entity, config: &RenderConfig) -> CacheSizing {
        let bounds = entity.local_bounds();
        let mut logical_w = bounds.width();
        let mut logical_h = bounds.height();
        if let EntityKind::Text {
            path: Some(_),
            font_size,
            line_height,
            ..
        } = &entity.kind
        {
            // Glyphs on a path can wander outside the layout box by up to
            // a line.
            let margin = font_size * line_height;
            logical_w += margin;
            logical_h += margin;
        }
        if let Some(shadow) = &entity.shadow {
            // The shadow is baked into the bitmap, so leave room for its
            // spread on both sides.
            logical_w += 2.0 * (shadow.blur + shadow.offset_x.abs());
            logical_h += 2.0 * (shadow.blur + shadow.offset_y.abs());
        }
        let (scale_x, scale_y) = total_scale(entity.own_matrix());
        let retina = config.retina_scaling();
        let mut zoom_x = scale_x * retina;
        let mut zoom_y = scale_y * retina;
        let mut capped = false;

        let max_side = f64::from(config.max_cache_side_limit);
        let mut width = logical_w * zoom_x + ALIASING_MARGIN;
        let mut height = logical_h * zoom_y + ALIASING_MARGIN;
        if width > max_side {
            zoom_x *= max_side / width;
            width = max_side;
            capped = true;
        }
        if height > max_side {
            zoom_y *= max_side / height;
            height = max_side;
            capped = true;
        }
        let area_limit = f64::from(config.perf_limit_size_total);
        if width * height > area_limit {
            let factor = (area_limit / (width * height)).sqrt();
            zoom_x *= factor;
            zoom_y *= factor;
            width *= factor;
            height *= factor;
            capped = true;
        }
        let min_side = f64::from(config.min_cache_side_limit);
        width = width.max(min_side);
        height = height.max(min_side);

        CacheSizing {
            width: width.ceil().max(1.0) as u32,
            height: height.ceil().max(1.0) as u32,
            zoom_x,
            zoom_y,
            capped,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn allocated_dims(sizing: CacheSizing, config: &RenderConfig) -> (u32, u32) {
        if sizing.capped {
            return (sizing.width, sizing.height);
        }
        let cap = config.max_cache_side_limit;
        let pad = |v: u32| ((f64::from(v) * GROWTH_PADDING).ceil() as u32).min(cap).max(1);
        (pad(sizing.width), pad(sizing.height))
    }

    fn placement_for(pixmap: &Pixmap, sizing: CacheSizing) -> CachePlacement {
        CachePlacement {
            zoom_x: sizing.zoom_x,
            zoom_y: sizing.zoom_y,
            center_x: (f64::from(pixmap.width()) / 2.0).round(),
            center_y: (f64::from(pixmap.height()) / 2.0).round(),
        }
    }

    /// Whether the next [`CacheManager::render_cache`] will redraw.
    ///
    /// Invisible entities are never dirty. A size or zoom change resizes
    /// (or clears) the entry and reports dirty; an absolutely positioned
    /// clip depends on the entity transform and forces a redraw each pass.
    pub fn is_cache_dirty(&mut self, entity: &Entity, config: &RenderConfig) -> bool {
        if !entity.is_visible() {
            return false;
        }
        let sizing = Self::cache_dimensions(entity, config);
        let Some(entry) = self.entries.get_mut(&entity.id) else {
            return true;
        };
        let (cur_w, cur_h) = (entry.pixmap.width(), entry.pixmap.height());
        let grows = sizing.width > cur_w || sizing.height > cur_h;
        let shrinks = f64::from(sizing.width) < f64::from(cur_w) * SHRINK_THRESHOLD
            && f64::from(sizing.height) < f64::from(cur_h) * SHRINK_THRESHOLD
            && cur_w > config.min_cache_side_limit
            && cur_h > config.min_cache_side_limit;
        if grows || shrinks {
            let (w, h) = Self::allocated_dims(sizing, config);
            if let Some(pixmap) = Pixmap::new(w, h) {
                debug!(entity = %entity.id, from = ?(cur_w, cur_h), to = ?(w, h), "cache reallocated");
                entry.pixmap = pixmap;
                self.stats.reallocations += 1;
            }
            entry.placement = Self::placement_for(&entry.pixmap, sizing);
            entry.dirty = true;
            return true;
        }
        let zoom_changed = (entry.placement.zoom_x - sizing.zoom_x).abs() > 1e-12
            || (entry.placement.zoom_y - sizing.zoom_y).abs() > 1e-12;
        let absolute_clip = entity
            .clip_path
            .as_ref()
            .is_some_and(|c| c.absolute_positioned);
        if zoom_changed || entity.dirty || absolute_clip || entry.dirty {
            entry.pixmap.fill(Color::TRANSPARENT);
            entry.placement = Self::placement_for(&entry.pixmap, sizing);
            entry.dirty = true;
            return true;
        }
        false
    }

    /// Ensure the entity's cache bitmap exists and is up to date.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] when a cache bitmap cannot be
    /// allocated.
    pub fn render_cache(&mut self, entity: &mut Entity, config: &RenderConfig) -> RenderResult<()> {
        if !self.is_cache_dirty(entity, config) && self.entries.contains_key(&entity.id) {
            self.stats.hits += 1;
            return Ok(());
        }
        self.stats.misses += 1;
        let sizing = Self::cache_dimensions(entity, config);
        if !self.entries.contains_key(&entity.id) {
            let (w, h) = Self::allocated_dims(sizing, config);
            let pixmap = Pixmap::new(w, h)
                .ok_or_else(|| RenderError::Surface(format!("cache allocation {w}x{h} failed")))?;
            self.stats.reallocations += 1;
            let placement = Self::placement_for(&pixmap, sizing);
            self.entries.insert(
                entity.id,
                CacheEntry {
                    pixmap,
                    placement,
                    dirty: true,
                },
            );
        }
        let entry = self
            .entries
            .remove(&entity.id)
            .ok_or_else(|| RenderError::Surface("cache entry vanished".to_string()))?;
        let placement = entry.placement;
        let mut painter = PixmapPainter::from_pixmap(entry.pixmap);
        painter.set_transform(
            Affine::translate((placement.center_x, placement.center_y))
                * Affine::scale_non_uniform(placement.zoom_x, placement.zoom_y),
        );
        if let Some(shadow) = &entity.shadow {
            painter.set_shadow(Some(shadow.scaled(placement.zoom_x, placement.zoom_y)));
        }
        draw_entity_content(&mut painter, entity, self, config)?;
        let mut pixmap = painter.into_pixmap();
        if let Some(clip) = entity.clip_path.clone() {
            Self::composite_clip(&mut pixmap, entity, &clip, placement);
        }
        entity.dirty = false;
        self.entries.insert(
            entity.id,
            CacheEntry {
                pixmap,
                placement,
                dirty: false,
            },
        );
        Ok(())
    }

    /// Mask the cache bitmap by the clip entity's silhouette.
    fn composite_clip(
        pixmap: &mut Pixmap,
        entity: &Entity,
        clip: &easel_core::entity::ClipPath,
        placement: CachePlacement,
    ) {
        let Some(mask_pixmap) = Pixmap::new(pixmap.width(), pixmap.height()) else {
            return;
        };
        let mut mask = PixmapPainter::from_pixmap(mask_pixmap);
        let mut base = Affine::translate((placement.center_x, placement.center_y))
            * Affine::scale_non_uniform(placement.zoom_x, placement.zoom_y);
        if clip.absolute_positioned {
            // Clip coordinates live in the entity's parent space.
            if let Some(inverse) = invert(entity.own_matrix()) {
                base *= inverse;
            }
        }
        mask.set_transform(base * clip.entity.own_matrix());
        draw_silhouette(&mut mask, &clip.entity);
        let blend = if clip.inverted {
            BlendMode::DestinationOut
        } else {
            BlendMode::DestinationIn
        };
        pixmap.draw_pixmap(
            0,
            0,
            mask.pixmap().as_ref(),
            &PixmapPaint {
                blend_mode: blend,
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
    }

    /// The cache bitmap and placement for an entity, if one exists.
    #[must_use]
    pub fn placement(&self, id: Uuid) -> Option<(&Pixmap, CachePlacement)> {
        self.entries
            .get(&id)
            .map(|entry| (&entry.pixmap, entry.placement))
    }

    /// Drop one entity's cache.
    pub fn invalidate(&mut self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Drop every cache.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Fill the opaque silhouette of an entity, recursing into groups.
pub(crate) fn draw_silhouette<P: Painter>(painter: &mut P, entity: &Entity) {
    let white = easel_core::Paint::color("#ffffff");
    if let Some(path) = easel_core::shapes::local_path(entity) {
        painter.fill_path(
            &path,
            &white,
            entity.fill_rule,
            entity.local_bounds(),
        );
        return;
    }
    if let EntityKind::Group { children } = &entity.kind {
        for child in children {
            painter.save();
            painter.concat_transform(child.own_matrix());
            draw_silhouette(painter, child);
            painter.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::entity::{ClipPath, Prop};
    use easel_core::paint::Paint;
    use easel_core::shadow::Shadow;
    use easel_core::shapes;

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn test_missing_entry_is_dirty() {
        let mut cache = CacheManager::new();
        let rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        assert!(cache.is_cache_dirty(&rect, &config()));
    }

    #[test]
    fn test_invisible_entity_is_never_dirty() {
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        rect.visible = false;
        assert!(!cache.is_cache_dirty(&rect, &config()));
    }

    #[test]
    fn test_render_then_clean_then_dirty_on_change() {
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        cache.render_cache(&mut rect, &config()).expect("render");
        assert!(!cache.is_cache_dirty(&rect, &config()));
        rect.set(Prop::Fill(Paint::color("teal")), &config());
        assert!(cache.is_cache_dirty(&rect, &config()));
        cache.render_cache(&mut rect, &config()).expect("render");
        assert!(!cache.is_cache_dirty(&rect, &config()));
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        cache.render_cache(&mut rect, &config()).expect("render");
        cache.render_cache(&mut rect, &config()).expect("render");
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.reallocations, 1);
    }

    #[test]
    fn test_dimensions_respect_side_limit() {
        let cfg = config();
        let mut rect = shapes::rect(0.0, 0.0, 10_000.0, 10.0);
        rect.scale_x = 1.0;
        let sizing = CacheManager::cache_dimensions(&rect, &cfg);
        assert!(sizing.width <= cfg.max_cache_side_limit);
        assert!(sizing.capped);
        assert!(sizing.zoom_x < 1.0);
    }

    #[test]
    fn test_dimensions_respect_area_limit() {
        let cfg = config();
        let mut rect = shapes::rect(0.0, 0.0, 4000.0, 4000.0);
        rect.scale_x = 1.0;
        let sizing = CacheManager::cache_dimensions(&rect, &cfg);
        let area = u64::from(sizing.width) * u64::from(sizing.height);
        let budget = u64::from(cfg.perf_limit_size_total);
        // Ceiling rounding can overshoot by a sliver.
        assert!(area <= budget + budget / 50);
        assert!(sizing.capped);
    }

    #[test]
    fn test_dimensions_floor_to_minimum() {
        let cfg = config();
        let rect = shapes::rect(0.0, 0.0, 4.0, 4.0);
        let sizing = CacheManager::cache_dimensions(&rect, &cfg);
        assert_eq!(sizing.width, cfg.min_cache_side_limit);
        assert_eq!(sizing.height, cfg.min_cache_side_limit);
    }

    #[test]
    fn test_zoom_never_increased_by_limits() {
        let cfg = config();
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.scale_x = 2.0;
        rect.scale_y = 2.0;
        let sizing = CacheManager::cache_dimensions(&rect, &cfg);
        assert!(sizing.zoom_x <= 2.0 * cfg.retina_scaling() + 1e-9);
        assert!(sizing.zoom_y <= 2.0 * cfg.retina_scaling() + 1e-9);
    }

    #[test]
    fn test_small_shrink_reuses_buffer() {
        let cfg = config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 500.0, 500.0);
        cache.render_cache(&mut rect, &cfg).expect("render");
        let before = cache.stats().reallocations;
        // 5% smaller: inside the shrink threshold, buffer stays.
        rect.set(Prop::Width(475.0), &cfg);
        rect.set(Prop::Height(475.0), &cfg);
        cache.render_cache(&mut rect, &cfg).expect("render");
        assert_eq!(cache.stats().reallocations, before);
    }

    #[test]
    fn test_large_shrink_reallocates() {
        let cfg = config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 2000.0, 2000.0);
        cache.render_cache(&mut rect, &cfg).expect("render");
        let before = cache.stats().reallocations;
        rect.set(Prop::Width(400.0), &cfg);
        rect.set(Prop::Height(400.0), &cfg);
        cache.render_cache(&mut rect, &cfg).expect("render");
        assert_eq!(cache.stats().reallocations, before + 1);
    }

    #[test]
    fn test_absolute_clip_forces_redraw() {
        let cfg = config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        rect.clip_path = Some(ClipPath {
            entity: Box::new(shapes::ellipse(0.0, 0.0, 30.0, 30.0)),
            inverted: false,
            absolute_positioned: true,
        });
        cache.render_cache(&mut rect, &cfg).expect("render");
        assert!(cache.is_cache_dirty(&rect, &cfg));
    }

    #[test]
    fn test_structural_need_overrides_disabled_caching() {
        let cfg = RenderConfig {
            object_caching: false,
            ..config()
        };
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        assert!(!CacheManager::should_cache(&rect, &cfg, false));
        rect.clip_path = Some(ClipPath {
            entity: Box::new(shapes::ellipse(0.0, 0.0, 30.0, 30.0)),
            inverted: false,
            absolute_positioned: false,
        });
        assert!(CacheManager::should_cache(&rect, &cfg, false));
    }

    #[test]
    fn test_shadow_forces_caching_only_for_stroke_first() {
        let cfg = RenderConfig {
            object_caching: false,
            ..config()
        };
        let mut rect = shapes::rect(0.0, 0.0, 50.0, 50.0);
        rect.set(Prop::Stroke(Paint::color("black")), &cfg);
        rect.shadow = Some(Shadow {
            blur: 4.0,
            ..Shadow::default()
        });
        assert!(!CacheManager::should_cache(&rect, &cfg, false));
        rect.set(Prop::PaintFirst(PaintFirst::Stroke), &cfg);
        assert!(CacheManager::should_cache(&rect, &cfg, false));
    }

    #[test]
    fn test_cache_bakes_shadow_pixels() {
        let cfg = config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 30.0, 30.0);
        rect.set(Prop::Fill(Paint::color("red")), &cfg);
        rect.shadow = Some(Shadow {
            color: "black".to_string(),
            offset_x: 25.0,
            offset_y: 25.0,
            ..Shadow::default()
        });
        cache.render_cache(&mut rect, &cfg).expect("render");
        let (pixmap, placement) = cache.placement(rect.id).expect("entry");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let sample = |lx: f64, ly: f64| {
            let x = (placement.center_x + lx * placement.zoom_x) as u32;
            let y = (placement.center_y + ly * placement.zoom_y) as u32;
            pixmap.pixel(x, y).expect("pixel").alpha()
        };
        // The shape itself spans [-15, 15] on each axis.
        assert!(sample(0.0, 0.0) > 0);
        // Local (30, 30) is outside the shape but inside its offset shadow.
        assert!(sample(30.0, 30.0) > 0);
    }

    #[test]
    fn test_clip_masks_cache_content() {
        let cfg = config();
        let mut cache = CacheManager::new();
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.set(Prop::Fill(Paint::color("red")), &cfg);
        rect.clip_path = Some(ClipPath {
            // Left half of the rect, in its centered local space.
            entity: Box::new(shapes::rect(-50.0, -50.0, 50.0, 100.0)),
            inverted: false,
            absolute_positioned: false,
        });
        cache.render_cache(&mut rect, &cfg).expect("render");
        let (pixmap, placement) = cache.placement(rect.id).expect("entry");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let sample = |lx: f64, ly: f64| {
            let x = (placement.center_x + lx * placement.zoom_x) as u32;
            let y = (placement.center_y + ly * placement.zoom_y) as u32;
            pixmap.pixel(x, y).expect("pixel").alpha()
        };
        assert!(sample(-25.0, 0.0) > 0);
        assert_eq!(sample(25.0, 0.0), 0);
    }
}
