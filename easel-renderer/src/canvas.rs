//! The static canvas compositor.
//!
//! A [`StaticCanvas`] owns the entity list (list order is paint order),
//! background and overlay layers, a scene clip, the viewport transform, and
//! the cache manager, and drives full render passes through any
//! [`Painter`]. Render requests coalesce through a [`RenderScheduler`] so
//! repeated mutations cost one pass.

use easel_core::abort::AbortSignal;
use easel_core::config::RenderConfig;
use easel_core::entity::{ClipPath, Entity};
use easel_core::event::{CanvasEvent, EventHandler};
use easel_core::hydrate::{enliven_objects, hydrate, Reviver};
use easel_core::matrix::invert;
use easel_core::paint::Paint;
use easel_core::pattern::Pattern;
use easel_core::scheduler::{ManualScheduler, RenderHandle, RenderScheduler};
use easel_core::{CoreError, CoreResult};
use kurbo::{Affine, Point, Rect};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cache::{draw_silhouette, CacheManager};
use crate::draw::render_entity;
use crate::error::RenderResult;
use crate::painter::{CompositeOp, Painter};
use crate::pixmap::PixmapPainter;

/// Options for [`StaticCanvas::load_from_json`].
#[derive(Default)]
pub struct LoadOptions<'a> {
    /// Abort signal observed throughout hydration.
    pub signal: Option<&'a AbortSignal>,
    /// Callback run on each revived entity.
    pub reviver: Option<Reviver<'a>>,
}

/// A retained scene compositor without interaction handling.
pub struct StaticCanvas<S: RenderScheduler = ManualScheduler> {
    pub(crate) entities: Vec<Entity>,
    /// Background paint, drawn below everything in surface space.
    pub background_color: Paint,
    /// Background entity, drawn above the background color in scene space.
    pub background_image: Option<Entity>,
    /// Overlay paint, drawn above the scene in surface space.
    pub overlay_color: Paint,
    /// Overlay entity, drawn above the overlay color in scene space.
    pub overlay_image: Option<Entity>,
    /// Scene-wide clip applied to the finished frame.
    pub clip_path: Option<ClipPath>,
    /// Whether scene serialization keeps default-valued properties.
    pub include_default_values: bool,
    /// Whether membership changes request a render pass.
    pub render_on_add_remove: bool,
    pub(crate) viewport_transform: Affine,
    pub(crate) width: f64,
    pub(crate) height: f64,
    pub(crate) config: RenderConfig,
    pub(crate) cache: CacheManager,
    scheduler: S,
    pending: Option<RenderHandle>,
    handlers: Vec<EventHandler>,
    post_render: Vec<Box<dyn FnOnce()>>,
    disposed: bool,
}

impl StaticCanvas<ManualScheduler> {
    /// Create a canvas with a manually pumped scheduler.
    #[must_use]
    pub fn new(width: f64, height: f64, config: RenderConfig) -> Self {
        Self::with_scheduler(width, height, config, ManualScheduler::new())
    }
}

impl<S: RenderScheduler> StaticCanvas<S> {
    /// Create a canvas driven by the given scheduler.
    pub fn with_scheduler(width: f64, height: f64, config: RenderConfig, scheduler: S) -> Self {
        Self {
            entities: Vec::new(),
            background_color: Paint::None,
            background_image: None,
            overlay_color: Paint::None,
            overlay_image: None,
            clip_path: None,
            include_default_values: true,
            render_on_add_remove: true,
            viewport_transform: Affine::IDENTITY,
            width,
            height,
            config,
            cache: CacheManager::new(),
            scheduler,
            pending: None,
            handlers: Vec::new(),
            post_render: Vec::new(),
            disposed: false,
        }
    }

    /// Logical width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Logical height.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Shared rendering configuration.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Entities in paint order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Mutable access to an entity by id.
    pub fn entity_mut(&mut self, id: Uuid) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Register an event handler.
    pub fn on(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Register a callback that runs once, after the next completed render
    /// pass.
    pub fn on_after_next_render(&mut self, callback: Box<dyn FnOnce()>) {
        self.post_render.push(callback);
    }

    fn emit(&self, event: &CanvasEvent) {
        for handler in &self.handlers {
            handler(event);
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Append an entity, making it the topmost.
    pub fn add(&mut self, entity: Entity) -> Uuid {
        let id = entity.id;
        self.entities.push(entity);
        self.emit(&CanvasEvent::ObjectAdded {
            id,
            index: self.entities.len() - 1,
        });
        if self.render_on_add_remove {
            self.request_render_all();
        }
        id
    }

    /// Insert an entity at a position in the paint order.
    pub fn insert_at(&mut self, index: usize, entity: Entity) -> Uuid {
        let id = entity.id;
        let index = index.min(self.entities.len());
        self.entities.insert(index, entity);
        self.emit(&CanvasEvent::ObjectAdded { id, index });
        if self.render_on_add_remove {
            self.request_render_all();
        }
        id
    }

    /// Remove an entity by id, returning it.
    pub fn remove(&mut self, id: Uuid) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.id == id)?;
        let entity = self.entities.remove(index);
        self.cache.invalidate(id);
        self.emit(&CanvasEvent::ObjectRemoved { id });
        if self.render_on_add_remove {
            self.request_render_all();
        }
        Some(entity)
    }

    /// Remove every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.cache.clear();
        self.emit(&CanvasEvent::CanvasCleared);
        if self.render_on_add_remove {
            self.request_render_all();
        }
    }

    // ------------------------------------------------------------------
    // Z-order
    // ------------------------------------------------------------------

    fn position_of(&self, id: Uuid) -> Option<usize> {
        self.entities.iter().position(|e| e.id == id)
    }

    /// Move an entity to the top of the paint order.
    pub fn bring_object_to_front(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if index == self.entities.len() - 1 {
            return false;
        }
        let entity = self.entities.remove(index);
        self.entities.push(entity);
        true
    }

    /// Move an entity to the bottom of the paint order.
    pub fn send_object_to_back(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if index == 0 {
            return false;
        }
        let entity = self.entities.remove(index);
        self.entities.insert(0, entity);
        true
    }

    /// Swap an entity with its upper neighbor.
    pub fn bring_object_forward(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if index + 1 >= self.entities.len() {
            return false;
        }
        self.entities.swap(index, index + 1);
        true
    }

    /// Swap an entity with its lower neighbor.
    pub fn send_object_backwards(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if index == 0 {
            return false;
        }
        self.entities.swap(index, index - 1);
        true
    }

    /// Move an entity to an exact position in the paint order.
    pub fn move_object_to(&mut self, id: Uuid, to: usize) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        let to = to.min(self.entities.len() - 1);
        if to == index {
            return false;
        }
        let entity = self.entities.remove(index);
        self.entities.insert(to, entity);
        true
    }

    // ------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------

    /// The viewport transform (scene space → surface space).
    #[must_use]
    pub fn viewport_transform(&self) -> Affine {
        self.viewport_transform
    }

    /// Replace the viewport transform.
    pub fn set_viewport_transform(&mut self, transform: Affine) {
        self.viewport_transform = transform;
        self.request_render_all();
    }

    /// Current uniform zoom factor.
    #[must_use]
    pub fn get_zoom(&self) -> f64 {
        let coeffs = self.viewport_transform.as_coeffs();
        coeffs[0].hypot(coeffs[1])
    }

    /// Zoom about the surface origin.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom_to_point(Point::ZERO, zoom);
    }

    /// Zoom keeping the given surface point fixed.
    pub fn zoom_to_point(&mut self, point: Point, zoom: f64) {
        let before = invert(self.viewport_transform)
            .map_or(point, |inverse| inverse * point);
        let [_, _, _, _, e, f] = self.viewport_transform.as_coeffs();
        let mut vpt = Affine::new([zoom, 0.0, 0.0, zoom, e, f]);
        let after = vpt * before;
        vpt = Affine::translate((point.x - after.x, point.y - after.y)) * vpt;
        self.set_viewport_transform(vpt);
    }

    /// Pan so the given scene point sits at the surface origin.
    pub fn absolute_pan(&mut self, point: Point) {
        let [a, b, c, d, _, _] = self.viewport_transform.as_coeffs();
        self.set_viewport_transform(Affine::new([a, b, c, d, -point.x, -point.y]));
    }

    /// Pan by a surface-space delta.
    pub fn relative_pan(&mut self, delta: Point) {
        let [a, b, c, d, e, f] = self.viewport_transform.as_coeffs();
        self.set_viewport_transform(Affine::new([a, b, c, d, e + delta.x, f + delta.y]));
    }

    /// Resize the logical surface.
    pub fn set_dimensions(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.request_render_all();
    }

    /// The visible rectangle in scene coordinates.
    #[must_use]
    pub fn calc_viewport_boundaries(&self) -> Rect {
        let inverse = invert(self.viewport_transform).unwrap_or(Affine::IDENTITY);
        let corners = [
            inverse * Point::ZERO,
            inverse * Point::new(self.width, 0.0),
            inverse * Point::new(0.0, self.height),
            inverse * Point::new(self.width, self.height),
        ];
        let xs = corners.iter().map(|p| p.x);
        let ys = corners.iter().map(|p| p.y);
        Rect::new(
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        )
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Request a render pass on the next scheduler tick.
    ///
    /// Repeated requests coalesce onto one pending handle; a disposed
    /// canvas ignores requests.
    pub fn request_render_all(&mut self) {
        if self.disposed || self.pending.is_some() {
            return;
        }
        self.pending = Some(self.scheduler.schedule());
    }

    /// Cancel a pending render request.
    pub fn cancel_requested_render(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel(handle);
        }
    }

    /// Whether a render request is waiting for its tick.
    #[must_use]
    pub fn has_pending_render(&self) -> bool {
        self.pending.is_some()
    }

    /// The scheduler, for driving ticks externally.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Run the pending render pass if its tick has fired.
    ///
    /// Returns whether a pass ran.
    ///
    /// # Errors
    ///
    /// Propagates render pass failures; the pending handle is consumed
    /// either way.
    pub fn tick<P: Painter>(&mut self, painter: &mut P) -> RenderResult<bool> {
        let due = self
            .pending
            .is_some_and(|handle| self.scheduler.is_due(handle));
        if !due {
            return Ok(false);
        }
        self.pending = None;
        self.render_all(painter)?;
        Ok(true)
    }

    /// Run a full render pass immediately.
    ///
    /// # Errors
    ///
    /// Propagates cache allocation failures from entity rendering.
    #[instrument(skip_all, fields(entities = self.entities.len()))]
    pub fn render_all<P: Painter>(&mut self, painter: &mut P) -> RenderResult<()> {
        painter.clear(None);
        self.emit(&CanvasEvent::BeforeRender);

        let surface = Rect::new(0.0, 0.0, self.width, self.height);
        if !self.background_color.is_none() {
            painter.fill_rect(surface, &self.background_color, surface);
        }
        let viewport = self.viewport_transform;
        let bounds = self.calc_viewport_boundaries();
        if let Some(background) = &mut self.background_image {
            painter.save();
            painter.set_transform(viewport);
            render_entity(painter, background, &mut self.cache, &self.config, None, 1.0)?;
            painter.restore();
        }

        painter.save();
        painter.set_transform(viewport);
        for entity in &mut self.entities {
            render_entity(
                painter,
                entity,
                &mut self.cache,
                &self.config,
                Some(bounds),
                1.0,
            )?;
        }
        painter.restore();

        if let Some(clip) = &self.clip_path {
            Self::composite_scene_clip(painter, clip, viewport, self.width, self.height)?;
        }

        if !self.overlay_color.is_none() {
            painter.fill_rect(surface, &self.overlay_color, surface);
        }
        if let Some(overlay) = &mut self.overlay_image {
            painter.save();
            painter.set_transform(viewport);
            render_entity(painter, overlay, &mut self.cache, &self.config, None, 1.0)?;
            painter.restore();
        }

        self.emit(&CanvasEvent::AfterRender);
        for callback in self.post_render.drain(..) {
            callback();
        }
        Ok(())
    }

    /// Mask the finished frame by the scene clip silhouette.
    ///
    /// The silhouette renders into its own surface, so a clip given as a
    /// group (or any entity without a direct outline) masks by the union
    /// of its leaf shapes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn composite_scene_clip<P: Painter>(
        painter: &mut P,
        clip: &ClipPath,
        viewport: Affine,
        width: f64,
        height: f64,
    ) -> RenderResult<()> {
        let mut mask = PixmapPainter::new(
            width.ceil().max(1.0) as u32,
            height.ceil().max(1.0) as u32,
        )?;
        mask.set_transform(viewport * clip.entity.own_matrix());
        draw_silhouette(&mut mask, &clip.entity);
        painter.save();
        painter.set_composite(if clip.inverted {
            CompositeOp::DestinationOut
        } else {
            CompositeOp::DestinationIn
        });
        painter.set_transform(Affine::IDENTITY);
        painter.set_alpha(1.0);
        painter.draw_surface(mask.pixmap(), Affine::IDENTITY);
        painter.restore();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    fn scene_object(&self, dataless: bool) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "version".to_string(),
            Value::from(easel_core::VERSION.to_string()),
        );
        let objects: Vec<Value> = self
            .entities
            .iter()
            .filter(|e| !e.exclude_from_export)
            .map(|e| {
                if dataless {
                    e.to_dataless_object(&self.config)
                } else {
                    e.to_object_with_defaults(&self.config, self.include_default_values)
                }
            })
            .collect();
        map.insert("objects".to_string(), Value::from(objects));
        if !self.background_color.is_none() {
            map.insert("background".to_string(), self.background_color.to_object());
        }
        if let Some(image) = &self.background_image {
            map.insert(
                "backgroundImage".to_string(),
                image.to_object_with_defaults(&self.config, self.include_default_values),
            );
        }
        if !self.overlay_color.is_none() {
            map.insert("overlay".to_string(), self.overlay_color.to_object());
        }
        if let Some(image) = &self.overlay_image {
            map.insert(
                "overlayImage".to_string(),
                image.to_object_with_defaults(&self.config, self.include_default_values),
            );
        }
        if let Some(clip) = &self.clip_path {
            if !clip.entity.exclude_from_export {
                let mut value = clip
                    .entity
                    .to_object_with_defaults(&self.config, self.include_default_values);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("inverted".to_string(), Value::from(clip.inverted));
                    obj.insert(
                        "absolutePositioned".to_string(),
                        Value::from(clip.absolute_positioned),
                    );
                }
                map.insert("clipPath".to_string(), value);
            }
        }
        Value::Object(map)
    }

    /// Serialize the scene to a plain object with a version tag.
    #[must_use]
    pub fn to_object(&self) -> Value {
        self.scene_object(false)
    }

    /// Serialize without embedded data payloads.
    #[must_use]
    pub fn to_dataless_object(&self) -> Value {
        self.scene_object(true)
    }

    /// Serialize the scene to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] when encoding fails.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(&self.to_object()).map_err(CoreError::from)
    }

    /// Parse a serialized background or overlay paint, loading the texture
    /// when the value describes a pattern.
    async fn hydrate_scene_paint(
        value: Option<&Value>,
        signal: Option<&AbortSignal>,
    ) -> CoreResult<Paint> {
        match value {
            Some(value) if Paint::value_is_pattern(value) => {
                Ok(Paint::Pattern(Pattern::from_object(value, signal).await?))
            }
            Some(value) => Paint::from_value(value, None),
            None => Ok(Paint::None),
        }
    }

    /// Replace the scene from a JSON description.
    ///
    /// All image sources are hydrated before anything is committed, so a
    /// failure (including abort) leaves the canvas untouched. Membership
    /// events and render requests are suppressed during repopulation; one
    /// render request fires at the end.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] for invalid JSON,
    /// [`CoreError::ClassNotFound`] for unknown type tags,
    /// [`CoreError::Aborted`] when the signal fires, or
    /// [`CoreError::ResourceLoad`] when an image cannot be loaded.
    pub async fn load_from_json(
        &mut self,
        json: &str,
        options: LoadOptions<'_>,
    ) -> CoreResult<()> {
        let scene: Value = serde_json::from_str(json)?;
        let objects = scene
            .get("objects")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let entities =
            enliven_objects(&objects, options.signal, &self.config, options.reviver).await?;

        let background_image = match scene.get("backgroundImage") {
            Some(value) if !value.is_null() => Some(
                enliven_objects(
                    std::slice::from_ref(value),
                    options.signal,
                    &self.config,
                    options.reviver,
                )
                .await?
                .remove(0),
            ),
            _ => None,
        };
        let overlay_image = match scene.get("overlayImage") {
            Some(value) if !value.is_null() => Some(
                enliven_objects(
                    std::slice::from_ref(value),
                    options.signal,
                    &self.config,
                    options.reviver,
                )
                .await?
                .remove(0),
            ),
            _ => None,
        };
        let clip_path = match scene.get("clipPath") {
            Some(value) if !value.is_null() => {
                let resources =
                    hydrate(std::slice::from_ref(value), options.signal).await?;
                let entity = Entity::from_object(value, &resources, &self.config)?;
                Some(ClipPath {
                    entity: Box::new(entity),
                    inverted: value
                        .get("inverted")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    absolute_positioned: value
                        .get("absolutePositioned")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            }
            _ => None,
        };
        let background_color =
            Self::hydrate_scene_paint(scene.get("background"), options.signal).await?;
        let overlay_color =
            Self::hydrate_scene_paint(scene.get("overlay"), options.signal).await?;

        // Everything hydrated; commit.
        debug!(entities = entities.len(), "scene loaded");
        let render_on_add_remove = self.render_on_add_remove;
        self.render_on_add_remove = false;
        self.entities.clear();
        self.cache.clear();
        self.entities.extend(entities);
        self.background_color = background_color;
        self.background_image = background_image;
        self.overlay_color = overlay_color;
        self.overlay_image = overlay_image;
        self.clip_path = clip_path;
        self.render_on_add_remove = render_on_add_remove;
        self.request_render_all();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    /// Whether the canvas has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Tear down, letting an in-flight render request settle first.
    ///
    /// The pending request is cancelled, queued post-render callbacks run,
    /// and the canvas then releases entities and caches as
    /// [`StaticCanvas::destroy`] does.
    pub async fn dispose(&mut self) {
        self.disposed = true;
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel(handle);
        }
        for callback in self.post_render.drain(..) {
            callback();
        }
        self.destroy();
    }

    /// Immediate teardown: release entities, caches, and handlers.
    pub fn destroy(&mut self) {
        self.disposed = true;
        self.entities.clear();
        self.cache.clear();
        self.handlers.clear();
        self.post_render.clear();
        self.background_image = None;
        self.overlay_image = None;
        self.clip_path = None;
    }
}
