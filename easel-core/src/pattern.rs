//! Pattern paint source.
//!
//! Patterns reference an image source and a repeat mode. Reconstruction from
//! a plain object is asynchronous because the image must be decoded first.

use std::fmt::Write;

use kurbo::Affine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abort::AbortSignal;
use crate::error::{CoreError, CoreResult};
use crate::gradient::next_svg_id;
use crate::loader::{load_image, LoadImageOptions, TextureData};
use crate::matrix::to_svg_attribute;

/// Tile repetition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    /// Tile in both directions.
    #[default]
    #[serde(rename = "repeat")]
    Repeat,
    /// Tile horizontally only.
    #[serde(rename = "repeat-x")]
    RepeatX,
    /// Tile vertically only.
    #[serde(rename = "repeat-y")]
    RepeatY,
    /// Draw the source once.
    #[serde(rename = "no-repeat")]
    NoRepeat,
}

/// A declarative pattern paint source.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// Image source: URL, data URI, or filesystem path.
    pub source: String,
    /// Repeat mode.
    pub repeat: RepeatMode,
    /// Horizontal tile offset.
    pub offset_x: f64,
    /// Vertical tile offset.
    pub offset_y: f64,
    /// Optional transform applied to the tile geometry.
    pub transform: Option<Affine>,
    /// Cross-origin hint carried through serialization.
    pub cross_origin: Option<String>,
    /// Decoded texture; absent until hydration completes.
    pub texture: Option<TextureData>,
    /// Unique id used for SVG `<defs>` references.
    pub id: String,
}

impl Pattern {
    /// Create a pattern from an already-decoded texture.
    #[must_use]
    pub fn new(source: String, texture: TextureData) -> Self {
        Self {
            source,
            repeat: RepeatMode::Repeat,
            offset_x: 0.0,
            offset_y: 0.0,
            transform: None,
            cross_origin: None,
            texture: Some(texture),
            id: next_svg_id(),
        }
    }

    /// Serialize to a plain object. The decoded texture is never serialized;
    /// only the source reference survives the round trip.
    #[must_use]
    pub fn to_object(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), Value::from("pattern"));
        map.insert("source".to_string(), Value::from(self.source.clone()));
        map.insert(
            "repeat".to_string(),
            serde_json::to_value(self.repeat).unwrap_or(Value::Null),
        );
        if self.offset_x != 0.0 || self.offset_y != 0.0 {
            map.insert("offsetX".to_string(), Value::from(self.offset_x));
            map.insert("offsetY".to_string(), Value::from(self.offset_y));
        }
        if let Some(t) = self.transform {
            map.insert(
                "patternTransform".to_string(),
                Value::from(t.as_coeffs().to_vec()),
            );
        }
        if let Some(co) = &self.cross_origin {
            map.insert("crossOrigin".to_string(), Value::from(co.clone()));
        }
        Value::Object(map)
    }

    /// Image source referenced by a serialized pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] when the `source` field is
    /// missing.
    pub fn source_of(value: &Value) -> CoreResult<&str> {
        value
            .as_object()
            .and_then(|obj| obj.get("source"))
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::MalformedInput("pattern without source".to_string()))
    }

    /// Reconstruct a pattern from a plain object, awaiting the image load.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] for a missing `source`,
    /// [`CoreError::Aborted`] when the signal fires, or
    /// [`CoreError::ResourceLoad`] when the image cannot be decoded.
    pub async fn from_object(value: &Value, signal: Option<&AbortSignal>) -> CoreResult<Self> {
        let source = Self::source_of(value)?.to_string();
        let cross_origin = value
            .as_object()
            .and_then(|obj| obj.get("crossOrigin"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let options = LoadImageOptions {
            signal: signal.cloned(),
            cross_origin,
        };
        let texture = load_image(&source, &options).await?;
        Self::from_object_with_texture(value, Some(texture))
    }

    /// Synchronous half of pattern construction, used once the image has
    /// already been hydrated.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] when required fields are
    /// missing or of the wrong shape.
    pub fn from_object_with_texture(
        value: &Value,
        texture: Option<TextureData>,
    ) -> CoreResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::MalformedInput("pattern must be an object".to_string()))?;
        let source = Self::source_of(value)?.to_string();
        let cross_origin = obj
            .get("crossOrigin")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let repeat = obj
            .get("repeat")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        let transform = match obj.get("patternTransform") {
            Some(v) => {
                let coeffs: Vec<f64> = serde_json::from_value(v.clone())?;
                let arr: [f64; 6] = coeffs.try_into().map_err(|_| {
                    CoreError::MalformedInput("patternTransform must have 6 entries".to_string())
                })?;
                Some(Affine::new(arr))
            }
            None => None,
        };
        Ok(Self {
            source,
            repeat,
            offset_x: obj.get("offsetX").and_then(Value::as_f64).unwrap_or(0.0),
            offset_y: obj.get("offsetY").and_then(Value::as_f64).unwrap_or(0.0),
            transform,
            cross_origin,
            texture,
            id: next_svg_id(),
        })
    }

    /// Emit SVG markup for this pattern definition.
    ///
    /// The tile content references the original source so vector output does
    /// not embed decoded pixels.
    #[must_use]
    pub fn to_svg(&self) -> String {
        let (w, h) = self
            .texture
            .as_ref()
            .map_or((1, 1), |t| (t.width, t.height));
        let transform_attr = self
            .transform
            .map(|t| format!(" patternTransform=\"{}\"", to_svg_attribute(t, 6)))
            .unwrap_or_default();
        let mut svg = String::new();
        let _ = write!(
            svg,
            "<pattern id=\"{}\" patternUnits=\"userSpaceOnUse\" x=\"{}\" y=\"{}\" width=\"{w}\" height=\"{h}\"{transform_attr}>",
            self.id, self.offset_x, self.offset_y,
        );
        let _ = write!(
            svg,
            "<image x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\" href=\"{}\"/>",
            self.source,
        );
        svg.push_str("</pattern>");
        svg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortController;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn data_uri() -> String {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([0, 0, 255, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buf.into_inner())
        )
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let value = serde_json::json!({
            "source": data_uri(),
            "repeat": "repeat-x",
            "offsetX": 4.0,
            "offsetY": 0.0,
        });
        let pattern = Pattern::from_object(&value, None).await.expect("hydrate");
        assert_eq!(pattern.repeat, RepeatMode::RepeatX);
        assert!((pattern.offset_x - 4.0).abs() < f64::EPSILON);
        let texture = pattern.texture.as_ref().expect("texture");
        assert_eq!((texture.width, texture.height), (3, 2));

        let rebuilt = Pattern::from_object(&pattern.to_object(), None)
            .await
            .expect("rebuild");
        assert_eq!(rebuilt.repeat, pattern.repeat);
        assert_eq!(rebuilt.source, pattern.source);
    }

    #[tokio::test]
    async fn test_missing_source_is_malformed() {
        let value = serde_json::json!({"repeat": "repeat"});
        assert!(matches!(
            Pattern::from_object(&value, None).await,
            Err(CoreError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_rejects_before_load() {
        let controller = AbortController::new();
        controller.abort();
        let value = serde_json::json!({"source": data_uri()});
        let result = Pattern::from_object(&value, Some(&controller.signal())).await;
        assert!(matches!(result, Err(CoreError::Aborted)));
    }

    #[tokio::test]
    async fn test_svg_markup_references_source() {
        let value = serde_json::json!({"source": data_uri()});
        let pattern = Pattern::from_object(&value, None).await.expect("hydrate");
        let svg = pattern.to_svg();
        assert!(svg.starts_with("<pattern id=\"SVGID_"));
        assert!(svg.contains("width=\"3\" height=\"2\""));
        assert!(svg.ends_with("</pattern>"));
    }
}
