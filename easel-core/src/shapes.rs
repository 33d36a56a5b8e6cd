//! Shape constructors and local-space path building.
//!
//! Entities render in a centered local space: x spans `[-width/2, width/2]`
//! and y spans `[-height/2, height/2]`. The functions here build entities
//! positioned by their top-left corner (the default origin) and produce the
//! centered outline path a painter consumes.

use kurbo::{Affine, BezPath, Ellipse, Point, Rect, RoundedRect, Shape as _};

use crate::entity::{Entity, EntityKind};
use crate::loader::TextureData;

/// Flattening tolerance when converting analytic shapes to Bezier paths.
const PATH_TOLERANCE: f64 = 0.1;

/// Rectangle entity positioned by its top-left corner.
#[must_use]
pub fn rect(left: f64, top: f64, width: f64, height: f64) -> Entity {
    let mut e = Entity::new(EntityKind::Rect { rx: 0.0, ry: 0.0 });
    e.left = left;
    e.top = top;
    e.width = width;
    e.height = height;
    e
}

/// Rounded rectangle entity.
#[must_use]
pub fn rounded_rect(left: f64, top: f64, width: f64, height: f64, rx: f64, ry: f64) -> Entity {
    let mut e = rect(left, top, width, height);
    e.kind = EntityKind::Rect { rx, ry };
    e
}

/// Ellipse entity inscribed in the given box.
#[must_use]
pub fn ellipse(left: f64, top: f64, width: f64, height: f64) -> Entity {
    let mut e = Entity::new(EntityKind::Ellipse);
    e.left = left;
    e.top = top;
    e.width = width;
    e.height = height;
    e
}

/// Path entity from SVG path data.
///
/// The entity's width and height come from the path bounding box, and the
/// path renders centered on that box.
///
/// # Errors
///
/// Returns [`crate::error::CoreError::InvalidPath`] for unparseable data.
pub fn path_from_svg(data: &str, left: f64, top: f64) -> crate::error::CoreResult<Entity> {
    let parsed = BezPath::from_svg(data)
        .map_err(|e| crate::error::CoreError::InvalidPath(format!("{e}")))?;
    let (path, path_offset, bounds) = normalize_path(parsed);
    let mut e = Entity::new(EntityKind::Path { path, path_offset });
    e.left = left;
    e.top = top;
    e.width = bounds.width();
    e.height = bounds.height();
    Ok(e)
}

/// Image entity from a decoded texture; dimensions come from the pixels.
#[must_use]
pub fn image(src: String, texture: TextureData, left: f64, top: f64) -> Entity {
    let (w, h) = (f64::from(texture.width), f64::from(texture.height));
    let mut e = Entity::new(EntityKind::Image {
        src,
        cross_origin: None,
        texture: Some(texture),
    });
    e.left = left;
    e.top = top;
    e.width = w;
    e.height = h;
    e
}

/// Text entity with default font settings.
#[must_use]
pub fn text(content: &str, left: f64, top: f64) -> Entity {
    let mut e = Entity::new(EntityKind::Text {
        text: content.to_string(),
        font_family: "Times New Roman".to_string(),
        font_size: 40.0,
        line_height: 1.16,
        path: None,
    });
    e.left = left;
    e.top = top;
    e
}

/// Group entity owning the given children.
///
/// Children are positioned in the group's centered local space; the caller
/// supplies the group box.
#[must_use]
pub fn group(children: Vec<Entity>, left: f64, top: f64, width: f64, height: f64) -> Entity {
    let mut e = Entity::new(EntityKind::Group { children });
    e.left = left;
    e.top = top;
    e.width = width;
    e.height = height;
    e
}

/// Record the bounding-box center of a freshly parsed path.
///
/// The path keeps its original coordinates; the offset is subtracted at
/// draw time so the path renders centered in local space.
#[must_use]
pub fn normalize_path(path: BezPath) -> (BezPath, Point, Rect) {
    let bounds = path.bounding_box();
    let offset = bounds.center();
    (path, offset, bounds)
}

/// Outline of an entity in centered local space.
///
/// Text and groups have no single outline and return `None`; images return
/// their pixel box so masks and shadows can use the silhouette.
#[must_use]
pub fn local_path(entity: &Entity) -> Option<BezPath> {
    let half_w = entity.width / 2.0;
    let half_h = entity.height / 2.0;
    let bounds = Rect::new(-half_w, -half_h, half_w, half_h);
    match &entity.kind {
        EntityKind::Rect { rx, ry } => {
            if *rx > 0.0 || *ry > 0.0 {
                // Corner radii are circular; elliptical corners use the mean.
                let radius = (*rx + *ry) / 2.0;
                Some(RoundedRect::from_rect(bounds, radius).to_path(PATH_TOLERANCE))
            } else {
                Some(bounds.to_path(PATH_TOLERANCE))
            }
        }
        EntityKind::Ellipse => {
            Some(Ellipse::new(Point::ZERO, (half_w, half_h), 0.0).to_path(PATH_TOLERANCE))
        }
        EntityKind::Path { path, path_offset } => {
            Some(Affine::translate((-path_offset.x, -path_offset.y)) * path.clone())
        }
        EntityKind::Image { .. } => Some(bounds.to_path(PATH_TOLERANCE)),
        EntityKind::Text { .. } | EntityKind::Group { .. } => None,
    }
}
