//! The drawable entity: the fundamental scene node.
//!
//! An [`Entity`] couples one [`EntityKind`] (shape payload) with the shared
//! geometry, styling, caching, and serialization state every scene node
//! carries. Entities are owned by value: a canvas owns its list, a group owns
//! its children, and mutation of nested children flows through
//! [`Entity::set_nested`] so cache invalidation can follow the path down.

use kurbo::{Affine, BezPath, Point, Rect};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::error::{CoreError, CoreResult};
use crate::loader::Resources;
use crate::matrix::{compose, transformed_bounds, TransformOptions};
use crate::paint::Paint;
use crate::shadow::Shadow;

/// Fallback for a scale set to exactly zero; scale must never be zero
/// because the transform matrix would collapse.
const SCALE_EPSILON: f64 = 0.0001;

/// Horizontal origin reference of the `left` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginX {
    /// `left` anchors the left edge.
    #[default]
    Left,
    /// `left` anchors the horizontal center.
    Center,
    /// `left` anchors the right edge.
    Right,
}

/// Vertical origin reference of the `top` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginY {
    /// `top` anchors the top edge.
    #[default]
    Top,
    /// `top` anchors the vertical center.
    Center,
    /// `top` anchors the bottom edge.
    Bottom,
}

/// Stroke line-cap style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Flat cap at the endpoint.
    #[default]
    Butt,
    /// Semicircular cap.
    Round,
    /// Square cap extending past the endpoint.
    Square,
}

/// Stroke line-join style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    /// Sharp corner, limited by the miter limit.
    #[default]
    Miter,
    /// Rounded corner.
    Round,
    /// Beveled corner.
    Bevel,
}

/// Fill rule for self-intersecting paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRuleKind {
    /// Non-zero winding rule.
    #[default]
    NonZero,
    /// Even-odd rule.
    EvenOdd,
}

/// Paint order between fill and stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintFirst {
    /// Fill below the stroke.
    #[default]
    Fill,
    /// Stroke below the fill.
    Stroke,
}

/// Stroke parameters handed to the painter as one value.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    /// Stroke width in logical pixels.
    pub width: f64,
    /// Line-cap style.
    pub cap: LineCap,
    /// Line-join style.
    pub join: LineJoin,
    /// Miter limit for [`LineJoin::Miter`].
    pub miter_limit: f64,
    /// Dash pattern; empty means solid.
    pub dash_array: Vec<f64>,
    /// Offset into the dash pattern.
    pub dash_offset: f64,
    /// When set, the stroke width ignores object scaling.
    pub uniform: bool,
}

/// A clip mask applied to an entity or a whole scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPath {
    /// The entity whose silhouette clips.
    pub entity: Box<Entity>,
    /// Keep what is outside the mask instead of inside.
    pub inverted: bool,
    /// Interpret the clip coordinates in the parent's space rather than the
    /// clipped entity's local space.
    pub absolute_positioned: bool,
}

/// Shape payload of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// Axis-aligned rectangle with optional corner radii.
    Rect {
        /// Horizontal corner radius.
        rx: f64,
        /// Vertical corner radius.
        ry: f64,
    },
    /// Ellipse inscribed in the entity box.
    Ellipse,
    /// Arbitrary Bezier path.
    Path {
        /// Path data in the path's own coordinates.
        path: BezPath,
        /// Center of the path bounding box, subtracted so the path renders
        /// centered in local space.
        path_offset: Point,
    },
    /// Raster image.
    Image {
        /// Source URL, data URI, or filesystem path.
        src: String,
        /// Cross-origin hint carried through serialization.
        cross_origin: Option<String>,
        /// Decoded pixels; absent until hydrated. An image without a texture
        /// skips painting instead of failing the render pass.
        texture: Option<crate::loader::TextureData>,
    },
    /// Text run. Layout is out of scope; text renders in SVG export and is
    /// skipped by raster backends.
    Text {
        /// Text content.
        text: String,
        /// Font family name.
        font_family: String,
        /// Font size in logical pixels.
        font_size: f64,
        /// Line height as a multiple of the font size.
        line_height: f64,
        /// Optional path the text follows.
        path: Option<BezPath>,
    },
    /// Container for child entities, positioned in the group's centered
    /// local space.
    Group {
        /// Child entities, back-to-front.
        children: Vec<Entity>,
    },
}

impl EntityKind {
    /// Serialization type tag for this kind.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Rect { .. } => "rect",
            Self::Ellipse => "ellipse",
            Self::Path { .. } => "path",
            Self::Image { .. } => "image",
            Self::Text { .. } => "text",
            Self::Group { .. } => "group",
        }
    }
}

/// A settable entity property.
///
/// Property assignment goes through [`Entity::set`] so cache-affecting
/// changes can be tracked; the variants below replace a stringly-typed
/// property bag with one explicit match.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// Horizontal position of the origin point.
    Left(f64),
    /// Vertical position of the origin point.
    Top(f64),
    /// Unscaled width.
    Width(f64),
    /// Unscaled height.
    Height(f64),
    /// Horizontal scale; negative values toggle `flip_x`.
    ScaleX(f64),
    /// Vertical scale; negative values toggle `flip_y`.
    ScaleY(f64),
    /// Rotation angle in degrees.
    Angle(f64),
    /// Horizontal skew in degrees.
    SkewX(f64),
    /// Vertical skew in degrees.
    SkewY(f64),
    /// Horizontal mirror flag.
    FlipX(bool),
    /// Vertical mirror flag.
    FlipY(bool),
    /// Fill paint.
    Fill(Paint),
    /// Stroke paint.
    Stroke(Paint),
    /// Stroke width.
    StrokeWidth(f64),
    /// Dash pattern.
    StrokeDashArray(Vec<f64>),
    /// Dash offset.
    StrokeDashOffset(f64),
    /// Line cap.
    StrokeLineCap(LineCap),
    /// Line join.
    StrokeLineJoin(LineJoin),
    /// Miter limit.
    StrokeMiterLimit(f64),
    /// Zoom-independent stroke width flag.
    StrokeUniform(bool),
    /// Opacity in `[0, 1]`.
    Opacity(f64),
    /// Drop shadow.
    Shadow(Option<Shadow>),
    /// Visibility flag.
    Visible(bool),
    /// Background color behind the shape.
    BackgroundColor(String),
    /// Fill rule.
    FillRule(FillRuleKind),
    /// Paint order.
    PaintFirst(PaintFirst),
    /// Composite operation applied when this entity is drawn.
    GlobalCompositeOperation(String),
    /// Explicit dirty marking.
    Dirty(bool),
}

impl Prop {
    /// Whether assigning this property invalidates the entity's own cache.
    #[must_use]
    pub fn is_cache_affecting(&self) -> bool {
        matches!(
            self,
            Self::Width(_)
                | Self::Height(_)
                | Self::SkewX(_)
                | Self::SkewY(_)
                | Self::Fill(_)
                | Self::Stroke(_)
                | Self::StrokeWidth(_)
                | Self::StrokeDashArray(_)
                | Self::StrokeDashOffset(_)
                | Self::StrokeLineCap(_)
                | Self::StrokeLineJoin(_)
                | Self::StrokeMiterLimit(_)
                | Self::StrokeUniform(_)
                | Self::Shadow(_)
                | Self::BackgroundColor(_)
                | Self::FillRule(_)
                | Self::PaintFirst(_)
                | Self::Dirty(true)
        )
    }

    /// Whether assigning this property invalidates an owning group's cache
    /// without dirtying the entity itself (position-only changes).
    #[must_use]
    pub fn is_state_affecting(&self) -> bool {
        matches!(
            self,
            Self::Left(_)
                | Self::Top(_)
                | Self::ScaleX(_)
                | Self::ScaleY(_)
                | Self::Angle(_)
                | Self::FlipX(_)
                | Self::FlipY(_)
                | Self::Opacity(_)
                | Self::Visible(_)
                | Self::GlobalCompositeOperation(_)
        )
    }
}

/// One drawable scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Runtime identity; used as the cache key, never serialized.
    pub id: Uuid,
    /// Shape payload.
    pub kind: EntityKind,
    /// Horizontal position of the origin point in parent space.
    pub left: f64,
    /// Vertical position of the origin point in parent space.
    pub top: f64,
    /// Unscaled width.
    pub width: f64,
    /// Unscaled height.
    pub height: f64,
    /// Horizontal scale factor; always positive (see `flip_x`).
    pub scale_x: f64,
    /// Vertical scale factor; always positive (see `flip_y`).
    pub scale_y: f64,
    /// Rotation angle in degrees, about the origin point.
    pub angle: f64,
    /// Horizontal skew in degrees.
    pub skew_x: f64,
    /// Vertical skew in degrees.
    pub skew_y: f64,
    /// Mirror around the vertical axis.
    pub flip_x: bool,
    /// Mirror around the horizontal axis.
    pub flip_y: bool,
    /// Horizontal origin reference.
    pub origin_x: OriginX,
    /// Vertical origin reference.
    pub origin_y: OriginY,
    /// Fill paint.
    pub fill: Paint,
    /// Stroke paint.
    pub stroke: Paint,
    /// Stroke width in logical pixels.
    pub stroke_width: f64,
    /// Dash pattern; empty means solid.
    pub stroke_dash_array: Vec<f64>,
    /// Offset into the dash pattern.
    pub stroke_dash_offset: f64,
    /// Line cap.
    pub stroke_line_cap: LineCap,
    /// Line join.
    pub stroke_line_join: LineJoin,
    /// Miter limit.
    pub stroke_miter_limit: f64,
    /// When set, stroke width is not scaled with the object.
    pub stroke_uniform: bool,
    /// Opacity in `[0, 1]`, multiplied down the group chain.
    pub opacity: f64,
    /// Optional drop shadow.
    pub shadow: Option<Shadow>,
    /// Visibility flag.
    pub visible: bool,
    /// Background color painted behind the shape box.
    pub background_color: String,
    /// Fill rule.
    pub fill_rule: FillRuleKind,
    /// Paint order between fill and stroke.
    pub paint_first: PaintFirst,
    /// Composite operation applied when this entity is drawn.
    pub global_composite_operation: String,
    /// Optional clip mask.
    pub clip_path: Option<ClipPath>,
    /// Whether `to_object` keeps properties equal to the class defaults.
    pub include_default_values: bool,
    /// Skip this entity during scene serialization and SVG export.
    pub exclude_from_export: bool,
    /// Cache staleness flag, consumed by the cache manager.
    pub dirty: bool,
}

impl Entity {
    /// Create an entity of the given kind with class defaults.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_x: false,
            flip_y: false,
            origin_x: OriginX::Left,
            origin_y: OriginY::Top,
            fill: Paint::Color("rgb(0,0,0)".to_string()),
            stroke: Paint::None,
            stroke_width: 1.0,
            stroke_dash_array: Vec::new(),
            stroke_dash_offset: 0.0,
            stroke_line_cap: LineCap::Butt,
            stroke_line_join: LineJoin::Miter,
            stroke_miter_limit: 4.0,
            stroke_uniform: false,
            opacity: 1.0,
            shadow: None,
            visible: true,
            background_color: String::new(),
            fill_rule: FillRuleKind::NonZero,
            paint_first: PaintFirst::Fill,
            global_composite_operation: "source-over".to_string(),
            clip_path: None,
            include_default_values: true,
            exclude_from_export: false,
            // A fresh entity has never been drawn into a cache.
            dirty: true,
        }
    }

    /// The default entity for a type tag, used for default-value elision.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClassNotFound`] for an unknown tag.
    pub fn default_for_tag(tag: &str) -> CoreResult<Self> {
        let kind = match tag.to_ascii_lowercase().as_str() {
            "rect" => EntityKind::Rect { rx: 0.0, ry: 0.0 },
            "ellipse" => EntityKind::Ellipse,
            "path" => EntityKind::Path {
                path: BezPath::new(),
                path_offset: Point::ZERO,
            },
            "image" => EntityKind::Image {
                src: String::new(),
                cross_origin: None,
                texture: None,
            },
            "text" => EntityKind::Text {
                text: String::new(),
                font_family: "Times New Roman".to_string(),
                font_size: 40.0,
                line_height: 1.16,
                path: None,
            },
            "group" => EntityKind::Group {
                children: Vec::new(),
            },
            other => return Err(CoreError::ClassNotFound(other.to_string())),
        };
        Ok(Self::new(kind))
    }

    /// Serialization type tag.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// Whether the entity contributes anything to a render pass.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
            && self.opacity > 0.0
            && !(self.width == 0.0 && self.height == 0.0 && self.stroke_width == 0.0)
    }

    /// Stroke parameters as one value for the painter.
    #[must_use]
    pub fn stroke_style(&self) -> StrokeStyle {
        StrokeStyle {
            width: self.stroke_width,
            cap: self.stroke_line_cap,
            join: self.stroke_line_join,
            miter_limit: self.stroke_miter_limit,
            dash_array: self.stroke_dash_array.clone(),
            dash_offset: self.stroke_dash_offset,
            uniform: self.stroke_uniform,
        }
    }

    /// The entity's own transform matrix (parent space ← centered local
    /// space).
    ///
    /// Local space is centered on the shape: x spans `[-width/2, width/2]`.
    /// Rotation happens about the origin point selected by
    /// `origin_x`/`origin_y`.
    #[must_use]
    pub fn own_matrix(&self) -> Affine {
        let origin_dx = match self.origin_x {
            OriginX::Left => -self.width / 2.0,
            OriginX::Center => 0.0,
            OriginX::Right => self.width / 2.0,
        };
        let origin_dy = match self.origin_y {
            OriginY::Top => -self.height / 2.0,
            OriginY::Center => 0.0,
            OriginY::Bottom => self.height / 2.0,
        };
        compose(&TransformOptions {
            translate_x: self.left,
            translate_y: self.top,
            angle: self.angle,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            skew_x: self.skew_x,
            skew_y: self.skew_y,
            flip_x: self.flip_x,
            flip_y: self.flip_y,
        }) * Affine::translate((-origin_dx, -origin_dy))
    }

    /// Bounding box in centered local space, including the stroke.
    #[must_use]
    pub fn local_bounds(&self) -> Rect {
        let has_stroke = !self.stroke.is_none() && self.stroke_width > 0.0;
        let sw = if has_stroke { self.stroke_width } else { 0.0 };
        let hw = (self.width + sw) / 2.0;
        let hh = (self.height + sw) / 2.0;
        Rect::new(-hw, -hh, hw, hh)
    }

    /// Axis-aligned bounding box in the parent frame `parent`.
    #[must_use]
    pub fn bounding_box(&self, parent: Affine) -> Rect {
        transformed_bounds(parent * self.own_matrix(), self.local_bounds())
    }

    /// Whether any part of the entity intersects the scene-space viewport
    /// rectangle. Used to cull top-level entities only; group children are
    /// never individually culled.
    #[must_use]
    pub fn is_on_screen(&self, viewport_bounds: Rect) -> bool {
        let aabb = self.bounding_box(Affine::IDENTITY);
        aabb.x0 <= viewport_bounds.x1
            && aabb.x1 >= viewport_bounds.x0
            && aabb.y0 <= viewport_bounds.y1
            && aabb.y1 >= viewport_bounds.y0
    }

    fn normalize_scale(value: f64, flip: &mut bool, config: &RenderConfig) -> f64 {
        let mut magnitude = value;
        if magnitude < 0.0 {
            *flip = !*flip;
            magnitude = -magnitude;
        }
        if magnitude == 0.0 {
            SCALE_EPSILON
        } else if magnitude < config.min_scale_limit {
            config.min_scale_limit
        } else {
            magnitude
        }
    }

    /// Assign one property, tracking cache dirtiness.
    pub fn set(&mut self, prop: Prop, config: &RenderConfig) {
        let cache_affecting = prop.is_cache_affecting();
        match prop {
            Prop::Left(v) => self.left = v,
            Prop::Top(v) => self.top = v,
            Prop::Width(v) => self.width = v,
            Prop::Height(v) => self.height = v,
            Prop::ScaleX(v) => {
                self.scale_x = Self::normalize_scale(v, &mut self.flip_x, config);
            }
            Prop::ScaleY(v) => {
                self.scale_y = Self::normalize_scale(v, &mut self.flip_y, config);
            }
            Prop::Angle(v) => self.angle = v,
            Prop::SkewX(v) => self.skew_x = v,
            Prop::SkewY(v) => self.skew_y = v,
            Prop::FlipX(v) => self.flip_x = v,
            Prop::FlipY(v) => self.flip_y = v,
            Prop::Fill(v) => self.fill = v,
            Prop::Stroke(v) => self.stroke = v,
            Prop::StrokeWidth(v) => self.stroke_width = v,
            Prop::StrokeDashArray(v) => self.stroke_dash_array = v,
            Prop::StrokeDashOffset(v) => self.stroke_dash_offset = v,
            Prop::StrokeLineCap(v) => self.stroke_line_cap = v,
            Prop::StrokeLineJoin(v) => self.stroke_line_join = v,
            Prop::StrokeMiterLimit(v) => self.stroke_miter_limit = v,
            Prop::StrokeUniform(v) => self.stroke_uniform = v,
            Prop::Opacity(v) => self.opacity = v.clamp(0.0, 1.0),
            Prop::Shadow(v) => self.shadow = v,
            Prop::Visible(v) => self.visible = v,
            Prop::BackgroundColor(v) => self.background_color = v,
            Prop::FillRule(v) => self.fill_rule = v,
            Prop::PaintFirst(v) => self.paint_first = v,
            Prop::GlobalCompositeOperation(v) => self.global_composite_operation = v,
            Prop::Dirty(v) => self.dirty = v,
        }
        if cache_affecting {
            self.dirty = true;
        }
    }

    /// Assign a property on a group descendant, dirtying every entity along
    /// the path so enclosing group caches are invalidated.
    ///
    /// An empty path addresses this entity itself.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] when the path leads outside the
    /// tree or through a non-group entity.
    pub fn set_nested(&mut self, path: &[usize], prop: Prop, config: &RenderConfig) -> CoreResult<()> {
        let Some((&index, rest)) = path.split_first() else {
            self.set(prop, config);
            return Ok(());
        };
        let propagates = prop.is_cache_affecting() || prop.is_state_affecting();
        let EntityKind::Group { children } = &mut self.kind else {
            return Err(CoreError::MalformedInput(
                "set_nested path through a non-group entity".to_string(),
            ));
        };
        let child = children.get_mut(index).ok_or_else(|| {
            CoreError::MalformedInput(format!("set_nested index {index} out of bounds"))
        })?;
        child.set_nested(rest, prop, config)?;
        if propagates {
            self.dirty = true;
        }
        Ok(())
    }

    /// Serialize to a plain object.
    ///
    /// Numeric values are rounded to the configured precision. When
    /// `include_default_values` is false, properties equal to the class
    /// defaults are stripped, except `type`, `left`, and `top`.
    #[must_use]
    pub fn to_object(&self, config: &RenderConfig) -> Value {
        self.to_object_impl(config, self.include_default_values)
    }

    /// Serialize with an explicit include-defaults decision, overriding the
    /// entity's own flag. Scene serialization pushes its flag onto every
    /// member this way.
    #[must_use]
    pub fn to_object_with_defaults(&self, config: &RenderConfig, include_defaults: bool) -> Value {
        self.to_object_impl(config, include_defaults)
    }

    /// Serialize without embedded data payloads.
    ///
    /// Currently identical to [`Entity::to_object`]; kept as a separate
    /// entry point because scene serialization distinguishes the two.
    #[must_use]
    pub fn to_dataless_object(&self, config: &RenderConfig) -> Value {
        self.to_object_impl(config, self.include_default_values)
    }

    pub(crate) fn to_object_impl(&self, config: &RenderConfig, include_defaults: bool) -> Value {
        let full = self.full_object_map(config, include_defaults);
        if include_defaults {
            return Value::Object(full);
        }
        let defaults = match Self::default_for_tag(self.type_tag()) {
            Ok(default_entity) => default_entity.full_object_map(config, true),
            Err(_) => serde_json::Map::new(),
        };
        let mut out = serde_json::Map::new();
        for (key, value) in full {
            let keep = matches!(key.as_str(), "type" | "left" | "top")
                || defaults.get(&key) != Some(&value);
            if keep {
                out.insert(key, value);
            }
        }
        Value::Object(out)
    }

    #[allow(clippy::too_many_lines)]
    fn full_object_map(
        &self,
        config: &RenderConfig,
        include_defaults: bool,
    ) -> serde_json::Map<String, Value> {
        let round = |v: f64| Value::from(config.round(v));
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), Value::from(self.type_tag()));
        map.insert("left".to_string(), round(self.left));
        map.insert("top".to_string(), round(self.top));
        map.insert("width".to_string(), round(self.width));
        map.insert("height".to_string(), round(self.height));
        map.insert("scaleX".to_string(), round(self.scale_x));
        map.insert("scaleY".to_string(), round(self.scale_y));
        map.insert("angle".to_string(), round(self.angle));
        map.insert("skewX".to_string(), round(self.skew_x));
        map.insert("skewY".to_string(), round(self.skew_y));
        map.insert("flipX".to_string(), Value::from(self.flip_x));
        map.insert("flipY".to_string(), Value::from(self.flip_y));
        let origin_x = match self.origin_x {
            OriginX::Left => "left",
            OriginX::Center => "center",
            OriginX::Right => "right",
        };
        let origin_y = match self.origin_y {
            OriginY::Top => "top",
            OriginY::Center => "center",
            OriginY::Bottom => "bottom",
        };
        map.insert("originX".to_string(), Value::from(origin_x));
        map.insert("originY".to_string(), Value::from(origin_y));
        map.insert("fill".to_string(), self.fill.to_object());
        map.insert("stroke".to_string(), self.stroke.to_object());
        map.insert("strokeWidth".to_string(), round(self.stroke_width));
        map.insert(
            "strokeDashArray".to_string(),
            Value::from(
                self.stroke_dash_array
                    .iter()
                    .map(|v| config.round(*v))
                    .collect::<Vec<f64>>(),
            ),
        );
        map.insert(
            "strokeDashOffset".to_string(),
            round(self.stroke_dash_offset),
        );
        let cap = match self.stroke_line_cap {
            LineCap::Butt => "butt",
            LineCap::Round => "round",
            LineCap::Square => "square",
        };
        let join = match self.stroke_line_join {
            LineJoin::Miter => "miter",
            LineJoin::Round => "round",
            LineJoin::Bevel => "bevel",
        };
        map.insert("strokeLineCap".to_string(), Value::from(cap));
        map.insert("strokeLineJoin".to_string(), Value::from(join));
        map.insert(
            "strokeMiterLimit".to_string(),
            round(self.stroke_miter_limit),
        );
        map.insert(
            "strokeUniform".to_string(),
            Value::from(self.stroke_uniform),
        );
        map.insert("opacity".to_string(), round(self.opacity));
        map.insert(
            "shadow".to_string(),
            self.shadow
                .as_ref()
                .and_then(|s| serde_json::to_value(s).ok())
                .unwrap_or(Value::Null),
        );
        map.insert("visible".to_string(), Value::from(self.visible));
        map.insert(
            "backgroundColor".to_string(),
            Value::from(self.background_color.clone()),
        );
        let fill_rule = match self.fill_rule {
            FillRuleKind::NonZero => "nonzero",
            FillRuleKind::EvenOdd => "evenodd",
        };
        let paint_first = match self.paint_first {
            PaintFirst::Fill => "fill",
            PaintFirst::Stroke => "stroke",
        };
        map.insert("fillRule".to_string(), Value::from(fill_rule));
        map.insert("paintFirst".to_string(), Value::from(paint_first));
        map.insert(
            "globalCompositeOperation".to_string(),
            Value::from(self.global_composite_operation.clone()),
        );
        match &self.kind {
            EntityKind::Rect { rx, ry } => {
                map.insert("rx".to_string(), round(*rx));
                map.insert("ry".to_string(), round(*ry));
            }
            EntityKind::Ellipse => {}
            EntityKind::Path { path, .. } => {
                map.insert("path".to_string(), Value::from(path.to_svg()));
            }
            EntityKind::Image { src, cross_origin, .. } => {
                map.insert("src".to_string(), Value::from(src.clone()));
                map.insert(
                    "crossOrigin".to_string(),
                    cross_origin
                        .as_ref()
                        .map_or(Value::Null, |c| Value::from(c.clone())),
                );
            }
            EntityKind::Text {
                text,
                font_family,
                font_size,
                line_height,
                path,
            } => {
                map.insert("text".to_string(), Value::from(text.clone()));
                map.insert("fontFamily".to_string(), Value::from(font_family.clone()));
                map.insert("fontSize".to_string(), round(*font_size));
                map.insert("lineHeight".to_string(), round(*line_height));
                if let Some(p) = path {
                    map.insert("textPath".to_string(), Value::from(p.to_svg()));
                }
            }
            EntityKind::Group { children } => {
                let objects: Vec<Value> = children
                    .iter()
                    .filter(|child| !child.exclude_from_export)
                    .map(|child| child.to_object_impl(config, include_defaults))
                    .collect();
                map.insert("objects".to_string(), Value::from(objects));
            }
        }
        if let Some(clip) = &self.clip_path {
            if !clip.entity.exclude_from_export {
                let mut clip_value = clip.entity.to_object_impl(config, include_defaults);
                if let Some(obj) = clip_value.as_object_mut() {
                    obj.insert("inverted".to_string(), Value::from(clip.inverted));
                    obj.insert(
                        "absolutePositioned".to_string(),
                        Value::from(clip.absolute_positioned),
                    );
                }
                map.insert("clipPath".to_string(), clip_value);
            }
        }
        map
    }

    /// Reconstruct an entity from a plain object plus pre-hydrated
    /// resources.
    ///
    /// This is the synchronous half of two-phase construction; the async
    /// half lives in the hydration module and must have loaded any image
    /// textures into `resources` first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] for structurally invalid data,
    /// [`CoreError::ClassNotFound`] for unknown nested type tags, or
    /// [`CoreError::InvalidPath`] for unparseable path data.
    #[allow(clippy::too_many_lines)]
    pub fn from_object(
        value: &Value,
        resources: &Resources,
        config: &RenderConfig,
    ) -> CoreResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::MalformedInput("entity must be an object".to_string()))?;
        let tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::MalformedInput("entity without type tag".to_string()))?;
        let mut entity = Self::default_for_tag(tag)?;

        let num = |key: &str, default: f64| obj.get(key).and_then(Value::as_f64).unwrap_or(default);
        let flag = |key: &str, default: bool| {
            obj.get(key).and_then(Value::as_bool).unwrap_or(default)
        };
        entity.left = num("left", 0.0);
        entity.top = num("top", 0.0);
        entity.width = num("width", entity.width);
        entity.height = num("height", entity.height);
        entity.flip_x = flag("flipX", false);
        entity.flip_y = flag("flipY", false);
        // Serialized scales go through the same normalization as live
        // assignment, so a negative or zero value cannot sneak in.
        entity.scale_x = Self::normalize_scale(num("scaleX", 1.0), &mut entity.flip_x, config);
        entity.scale_y = Self::normalize_scale(num("scaleY", 1.0), &mut entity.flip_y, config);
        entity.angle = num("angle", 0.0);
        entity.skew_x = num("skewX", 0.0);
        entity.skew_y = num("skewY", 0.0);
        entity.origin_x = match obj.get("originX").and_then(Value::as_str) {
            Some("center") => OriginX::Center,
            Some("right") => OriginX::Right,
            _ => OriginX::Left,
        };
        entity.origin_y = match obj.get("originY").and_then(Value::as_str) {
            Some("center") => OriginY::Center,
            Some("bottom") => OriginY::Bottom,
            _ => OriginY::Top,
        };
        if let Some(fill) = obj.get("fill") {
            let texture = texture_for_paint(fill, resources);
            entity.fill = Paint::from_value(fill, texture)?;
        }
        if let Some(stroke) = obj.get("stroke") {
            let texture = texture_for_paint(stroke, resources);
            entity.stroke = Paint::from_value(stroke, texture)?;
        }
        entity.stroke_width = num("strokeWidth", entity.stroke_width);
        if let Some(dash) = obj.get("strokeDashArray").and_then(Value::as_array) {
            entity.stroke_dash_array = dash.iter().filter_map(Value::as_f64).collect();
        }
        entity.stroke_dash_offset = num("strokeDashOffset", 0.0);
        entity.stroke_line_cap = match obj.get("strokeLineCap").and_then(Value::as_str) {
            Some("round") => LineCap::Round,
            Some("square") => LineCap::Square,
            _ => LineCap::Butt,
        };
        entity.stroke_line_join = match obj.get("strokeLineJoin").and_then(Value::as_str) {
            Some("round") => LineJoin::Round,
            Some("bevel") => LineJoin::Bevel,
            _ => LineJoin::Miter,
        };
        entity.stroke_miter_limit = num("strokeMiterLimit", entity.stroke_miter_limit);
        entity.stroke_uniform = flag("strokeUniform", false);
        entity.opacity = num("opacity", 1.0);
        if let Some(shadow) = obj.get("shadow") {
            if !shadow.is_null() {
                entity.shadow = Some(serde_json::from_value(shadow.clone())?);
            }
        }
        entity.visible = flag("visible", true);
        if let Some(bg) = obj.get("backgroundColor").and_then(Value::as_str) {
            entity.background_color = bg.to_string();
        }
        entity.fill_rule = match obj.get("fillRule").and_then(Value::as_str) {
            Some("evenodd") => FillRuleKind::EvenOdd,
            _ => FillRuleKind::NonZero,
        };
        entity.paint_first = match obj.get("paintFirst").and_then(Value::as_str) {
            Some("stroke") => PaintFirst::Stroke,
            _ => PaintFirst::Fill,
        };
        if let Some(gco) = obj.get("globalCompositeOperation").and_then(Value::as_str) {
            entity.global_composite_operation = gco.to_string();
        }

        entity.kind = match &mut entity.kind {
            EntityKind::Rect { .. } => EntityKind::Rect {
                rx: num("rx", 0.0),
                ry: num("ry", 0.0),
            },
            EntityKind::Ellipse => EntityKind::Ellipse,
            EntityKind::Path { .. } => {
                let data = obj.get("path").and_then(Value::as_str).unwrap_or_default();
                let path = BezPath::from_svg(data)
                    .map_err(|e| CoreError::InvalidPath(format!("{e}")))?;
                let (path, path_offset, bounds) = crate::shapes::normalize_path(path);
                if entity.width == 0.0 && entity.height == 0.0 {
                    entity.width = bounds.width();
                    entity.height = bounds.height();
                }
                EntityKind::Path { path, path_offset }
            }
            EntityKind::Image { .. } => {
                let src = obj
                    .get("src")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let texture = resources.texture(&src).cloned();
                EntityKind::Image {
                    src,
                    cross_origin: obj
                        .get("crossOrigin")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    texture,
                }
            }
            EntityKind::Text {
                font_family,
                font_size,
                line_height,
                ..
            } => EntityKind::Text {
                text: obj
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                font_family: obj
                    .get("fontFamily")
                    .and_then(Value::as_str)
                    .unwrap_or(font_family)
                    .to_string(),
                font_size: num("fontSize", *font_size),
                line_height: num("lineHeight", *line_height),
                path: match obj.get("textPath").and_then(Value::as_str) {
                    Some(data) => Some(
                        BezPath::from_svg(data)
                            .map_err(|e| CoreError::InvalidPath(format!("{e}")))?,
                    ),
                    None => None,
                },
            },
            EntityKind::Group { .. } => {
                let mut children = Vec::new();
                if let Some(objects) = obj.get("objects").and_then(Value::as_array) {
                    for child_value in objects {
                        let child_tag = child_value
                            .get("type")
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                CoreError::MalformedInput(
                                    "group child without type tag".to_string(),
                                )
                            })?;
                        let factory = crate::registry::class_registry().get_class(child_tag)?;
                        children.push(factory(child_value, resources, config)?);
                    }
                }
                EntityKind::Group { children }
            }
        };

        if let Some(clip_value) = obj.get("clipPath") {
            if !clip_value.is_null() {
                let clip_entity = Self::from_object(clip_value, resources, config)?;
                entity.clip_path = Some(ClipPath {
                    entity: Box::new(clip_entity),
                    inverted: clip_value
                        .get("inverted")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    absolute_positioned: clip_value
                        .get("absolutePositioned")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
        }
        Ok(entity)
    }
}

/// Texture for a serialized paint value, when it is a pattern whose source
/// has been hydrated.
fn texture_for_paint(
    value: &Value,
    resources: &Resources,
) -> Option<crate::loader::TextureData> {
    if Paint::value_is_pattern(value) {
        crate::pattern::Pattern::source_of(value)
            .ok()
            .and_then(|src| resources.texture(src).cloned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes;

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn test_negative_scale_normalizes_to_flip() {
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.set(Prop::ScaleX(-2.0), &config());
        assert!((rect.scale_x - 2.0).abs() < f64::EPSILON);
        assert!(rect.flip_x);
        rect.set(Prop::ScaleX(-2.0), &config());
        assert!(!rect.flip_x);
    }

    #[test]
    fn test_zero_scale_clamps_to_epsilon() {
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.set(Prop::ScaleY(0.0), &config());
        assert!(rect.scale_y > 0.0);
        assert!(rect.scale_y <= 0.001);
    }

    #[test]
    fn test_min_scale_limit_clamps() {
        let cfg = RenderConfig {
            min_scale_limit: 0.5,
            ..RenderConfig::default()
        };
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.set(Prop::ScaleX(0.1), &cfg);
        assert!((rect.scale_x - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_affecting_prop_marks_dirty() {
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.dirty = false;
        rect.set(Prop::Left(5.0), &config());
        assert!(!rect.dirty);
        rect.set(Prop::Fill(Paint::color("blue")), &config());
        assert!(rect.dirty);
    }

    #[test]
    fn test_set_nested_dirties_group_chain() {
        let inner = shapes::rect(0.0, 0.0, 5.0, 5.0);
        let mut group = shapes::group(vec![inner], 0.0, 0.0, 10.0, 10.0);
        group.dirty = false;
        group
            .set_nested(&[0], Prop::Fill(Paint::color("green")), &config())
            .expect("set");
        assert!(group.dirty);
        let EntityKind::Group { children } = &group.kind else {
            panic!("group kind");
        };
        assert!(children[0].dirty);
    }

    #[test]
    fn test_set_nested_position_change_skips_child_dirty() {
        let inner = shapes::rect(0.0, 0.0, 5.0, 5.0);
        let mut group = shapes::group(vec![inner], 0.0, 0.0, 10.0, 10.0);
        group.dirty = false;
        if let EntityKind::Group { children } = &mut group.kind {
            children[0].dirty = false;
        }
        group
            .set_nested(&[0], Prop::Left(3.0), &config())
            .expect("set");
        assert!(group.dirty);
        let EntityKind::Group { children } = &group.kind else {
            panic!("group kind");
        };
        assert!(!children[0].dirty);
    }

    #[test]
    fn test_visibility_rules() {
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        assert!(rect.is_visible());
        rect.opacity = 0.0;
        assert!(!rect.is_visible());
        rect.opacity = 1.0;
        rect.visible = false;
        assert!(!rect.is_visible());
        rect.visible = true;
        rect.width = 0.0;
        rect.height = 0.0;
        rect.stroke_width = 0.0;
        assert!(!rect.is_visible());
    }

    #[test]
    fn test_object_round_trip_preserves_structure() {
        let mut rect = shapes::rect(10.0, 20.0, 100.0, 50.0);
        rect.set(Prop::Fill(Paint::color("red")), &config());
        rect.set(Prop::Angle(45.0), &config());
        let value = rect.to_object(&config());
        let rebuilt =
            Entity::from_object(&value, &Resources::default(), &config()).expect("rebuild");
        assert_eq!(rebuilt.to_object(&config()), value);
    }

    #[test]
    fn test_from_object_normalizes_scales() {
        let value = serde_json::json!({
            "type": "rect",
            "width": 10.0,
            "height": 10.0,
            "scaleX": -2.0,
            "scaleY": 0.0,
        });
        let entity =
            Entity::from_object(&value, &Resources::default(), &config()).expect("rebuild");
        // A negative scale folds into a flip; zero is lifted to a positive
        // floor so the transform stays invertible.
        assert!(entity.flip_x);
        assert!((entity.scale_x - 2.0).abs() < 1e-9);
        assert!(entity.scale_y > 0.0);
    }

    #[test]
    fn test_default_elision_keeps_type_left_top() {
        let mut rect = shapes::rect(1.0, 2.0, 0.0, 0.0);
        rect.include_default_values = false;
        rect.fill = Paint::Color("rgb(0,0,0)".to_string());
        let value = rect.to_object(&config());
        let obj = value.as_object().expect("object");
        assert_eq!(obj.get("type"), Some(&Value::from("rect")));
        assert!(obj.contains_key("left"));
        assert!(obj.contains_key("top"));
        assert!(!obj.contains_key("opacity"));
        assert!(!obj.contains_key("strokeDashArray"));
        assert!(!obj.contains_key("fill"));
    }

    #[test]
    fn test_default_elision_removes_reverted_prop() {
        let mut rect = shapes::rect(0.0, 0.0, 10.0, 10.0);
        rect.include_default_values = false;
        rect.set(Prop::Opacity(0.5), &config());
        let with_change = rect.to_object(&config());
        assert!(with_change.get("opacity").is_some());
        rect.set(Prop::Opacity(1.0), &config());
        let reverted = rect.to_object(&config());
        assert!(reverted.get("opacity").is_none());
    }

    #[test]
    fn test_numeric_rounding_applied() {
        let rect = shapes::rect(1.005_4, 0.0, 10.0, 10.0);
        let value = rect.to_object(&config());
        assert!((value.get("left").and_then(Value::as_f64).expect("left") - 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_clip_path_serializes_with_flags() {
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.clip_path = Some(ClipPath {
            entity: Box::new(shapes::ellipse(10.0, 10.0, 40.0, 40.0)),
            inverted: true,
            absolute_positioned: false,
        });
        let value = rect.to_object(&config());
        let clip = value.get("clipPath").expect("clipPath");
        assert_eq!(clip.get("type"), Some(&Value::from("ellipse")));
        assert_eq!(clip.get("inverted"), Some(&Value::from(true)));
        assert_eq!(clip.get("absolutePositioned"), Some(&Value::from(false)));
    }

    #[test]
    fn test_excluded_clip_path_is_skipped() {
        let mut clip_entity = shapes::ellipse(0.0, 0.0, 10.0, 10.0);
        clip_entity.exclude_from_export = true;
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.clip_path = Some(ClipPath {
            entity: Box::new(clip_entity),
            inverted: false,
            absolute_positioned: false,
        });
        assert!(rect.to_object(&config()).get("clipPath").is_none());
    }

    #[test]
    fn test_own_matrix_maps_origin_to_position() {
        let rect = shapes::rect(10.0, 20.0, 100.0, 50.0);
        // Default origin left/top: local top-left corner lands on (left, top).
        let p = rect.own_matrix() * kurbo::Point::new(-50.0, -25.0);
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!((p.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_of_rotated_rect() {
        let mut rect = shapes::rect(0.0, 0.0, 100.0, 100.0);
        rect.origin_x = OriginX::Center;
        rect.origin_y = OriginY::Center;
        rect.angle = 45.0;
        rect.stroke_width = 0.0;
        let aabb = rect.bounding_box(Affine::IDENTITY);
        let expected = 100.0 * 2.0_f64.sqrt();
        assert!((aabb.width() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_is_on_screen() {
        let rect = shapes::rect(10.0, 10.0, 50.0, 50.0);
        assert!(rect.is_on_screen(Rect::new(0.0, 0.0, 200.0, 200.0)));
        assert!(!rect.is_on_screen(Rect::new(500.0, 500.0, 700.0, 700.0)));
    }
}
