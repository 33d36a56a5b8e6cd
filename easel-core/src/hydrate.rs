//! Asynchronous hydration of serialized scenes.
//!
//! Entity construction is split in two phases: this module walks serialized
//! values, collects every image source they mention (image entities, pattern
//! fills and strokes, clip masks, group children), loads them all
//! concurrently into a [`Resources`] map, and only then runs the synchronous
//! registry factories. Failures are all-or-nothing: one bad object rejects
//! the whole batch.

use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

use crate::abort::{check_signal, AbortSignal};
use crate::config::RenderConfig;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::loader::{load_image, LoadImageOptions, Resources};
use crate::paint::Paint;
use crate::pattern::Pattern;
use crate::registry::class_registry;

/// Callback applied to each revived entity, with its source value.
pub type Reviver<'a> = &'a (dyn Fn(&Value, &mut Entity) + Send + Sync);

fn collect_paint_sources(value: &Value, out: &mut Vec<String>) {
    if Paint::value_is_pattern(value) {
        if let Ok(source) = Pattern::source_of(value) {
            if !out.iter().any(|s| s == source) {
                out.push(source.to_string());
            }
        }
    }
}

/// Collect every image source a serialized entity references, depth-first.
fn collect_sources(value: &Value, out: &mut Vec<String>) {
    let Some(obj) = value.as_object() else {
        return;
    };
    if obj.get("type").and_then(Value::as_str) == Some("image") {
        if let Some(src) = obj.get("src").and_then(Value::as_str) {
            if !src.is_empty() && !out.iter().any(|s| s == src) {
                out.push(src.to_string());
            }
        }
    }
    if let Some(fill) = obj.get("fill") {
        collect_paint_sources(fill, out);
    }
    if let Some(stroke) = obj.get("stroke") {
        collect_paint_sources(stroke, out);
    }
    if let Some(clip) = obj.get("clipPath") {
        collect_sources(clip, out);
    }
    if let Some(children) = obj.get("objects").and_then(Value::as_array) {
        for child in children {
            collect_sources(child, out);
        }
    }
}

/// Load every image source the given values reference.
///
/// Sources are deduplicated and loaded concurrently.
///
/// # Errors
///
/// Returns [`crate::error::CoreError::Aborted`] when the signal fires, or
/// [`crate::error::CoreError::ResourceLoad`] when any source fails to load.
pub async fn hydrate(values: &[Value], signal: Option<&AbortSignal>) -> CoreResult<Resources> {
    check_signal(signal)?;
    let mut sources = Vec::new();
    for value in values {
        collect_sources(value, &mut sources);
    }
    debug!(count = sources.len(), "hydrating image sources");
    let options = LoadImageOptions {
        signal: signal.cloned(),
        cross_origin: None,
    };
    let textures = try_join_all(sources.iter().map(|src| load_image(src, &options))).await?;
    let mut resources = Resources::default();
    for (src, texture) in sources.into_iter().zip(textures) {
        resources.insert_texture(src, texture);
    }
    Ok(resources)
}

/// Revive a batch of serialized entities.
///
/// Image sources are hydrated first, then each value goes through its
/// registered factory. The optional reviver runs on each entity after
/// construction.
///
/// # Errors
///
/// Returns [`crate::error::CoreError::ClassNotFound`] for an unknown type
/// tag, [`crate::error::CoreError::Aborted`] when the signal fires, or any
/// factory error. No partial batch is returned.
pub async fn enliven_objects(
    values: &[Value],
    signal: Option<&AbortSignal>,
    config: &RenderConfig,
    reviver: Option<Reviver<'_>>,
) -> CoreResult<Vec<Entity>> {
    let resources = hydrate(values, signal).await?;
    check_signal(signal)?;
    let mut entities = Vec::with_capacity(values.len());
    for value in values {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                crate::error::CoreError::MalformedInput("entity without type tag".to_string())
            })?;
        let factory = class_registry().get_class(tag)?;
        let mut entity = factory(value, &resources, config)?;
        if let Some(revive) = reviver {
            revive(value, &mut entity);
        }
        entities.push(entity);
    }
    Ok(entities)
}

/// Deep-clone an entity through serialization and the registry, so the copy
/// is rebuilt exactly as a loaded scene would build it.
///
/// # Errors
///
/// Propagates any hydration or factory error.
pub async fn clone_entity(entity: &Entity, config: &RenderConfig) -> CoreResult<Entity> {
    let value = entity.to_object_impl(config, true);
    let mut revived = enliven_objects(std::slice::from_ref(&value), None, config, None).await?;
    revived
        .pop()
        .ok_or_else(|| crate::error::CoreError::MalformedInput("clone produced nothing".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortController;
    use crate::entity::{EntityKind, Prop};
    use crate::error::CoreError;
    use crate::paint::Paint;
    use crate::shapes;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    fn data_uri() -> String {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 255, 0, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buf.into_inner())
        )
    }

    #[tokio::test]
    async fn test_enliven_builds_image_with_texture() {
        let value = serde_json::json!({
            "type": "image",
            "left": 0.0,
            "top": 0.0,
            "width": 4.0,
            "height": 4.0,
            "src": data_uri(),
        });
        let entities = enliven_objects(&[value], None, &config(), None)
            .await
            .expect("enliven");
        assert_eq!(entities.len(), 1);
        let EntityKind::Image { texture, .. } = &entities[0].kind else {
            panic!("image kind");
        };
        assert_eq!(texture.as_ref().map(|t| t.width), Some(4));
    }

    #[tokio::test]
    async fn test_enliven_is_all_or_nothing() {
        let good = serde_json::json!({"type": "rect", "left": 0.0, "top": 0.0});
        let bad = serde_json::json!({"type": "hexagon", "left": 0.0, "top": 0.0});
        let result = enliven_objects(&[good, bad], None, &config(), None).await;
        assert!(matches!(result, Err(CoreError::ClassNotFound(_))));
    }

    #[tokio::test]
    async fn test_enliven_honors_abort() {
        let controller = AbortController::new();
        controller.abort();
        let value = serde_json::json!({"type": "rect"});
        let result =
            enliven_objects(&[value], Some(&controller.signal()), &config(), None).await;
        assert!(matches!(result, Err(CoreError::Aborted)));
    }

    #[tokio::test]
    async fn test_reviver_runs_per_entity() {
        let values = [
            serde_json::json!({"type": "rect"}),
            serde_json::json!({"type": "ellipse"}),
        ];
        let reviver = |_: &Value, entity: &mut Entity| {
            entity.opacity = 0.25;
        };
        let entities = enliven_objects(&values, None, &config(), Some(&reviver))
            .await
            .expect("enliven");
        assert!(entities.iter().all(|e| (e.opacity - 0.25).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_pattern_fill_source_is_hydrated() {
        let value = serde_json::json!({
            "type": "rect",
            "width": 10.0,
            "height": 10.0,
            "fill": {"source": data_uri(), "repeat": "repeat"},
        });
        let entities = enliven_objects(&[value], None, &config(), None)
            .await
            .expect("enliven");
        let Paint::Pattern(pattern) = &entities[0].fill else {
            panic!("pattern fill");
        };
        assert!(pattern.texture.is_some());
    }

    #[tokio::test]
    async fn test_clone_preserves_properties() {
        let mut rect = shapes::rect(5.0, 6.0, 20.0, 30.0);
        rect.set(Prop::Fill(Paint::color("purple")), &config());
        rect.set(Prop::Angle(15.0), &config());
        let copy = clone_entity(&rect, &config()).await.expect("clone");
        assert_ne!(copy.id, rect.id);
        assert_eq!(copy.to_object(&config()), rect.to_object(&config()));
    }
}
