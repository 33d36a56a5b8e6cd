//! Fill and stroke paint sources.
//!
//! A paint is either a plain CSS color string, a gradient, a pattern, or
//! nothing. Serialized fillers are detected structurally: a color-stop list
//! means gradient, a `source` field means pattern, a bare string is a color.

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::gradient::Gradient;
use crate::loader::TextureData;
use crate::pattern::Pattern;

/// A paint source usable as fill or stroke.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Paint {
    /// No paint; the corresponding pass is skipped.
    #[default]
    None,
    /// Plain CSS color string.
    Color(String),
    /// Gradient filler.
    Gradient(Gradient),
    /// Pattern filler.
    Pattern(Pattern),
}

impl Paint {
    /// Convenience constructor for a plain color.
    #[must_use]
    pub fn color(value: &str) -> Self {
        Self::Color(value.to_string())
    }

    /// Whether this paint draws nothing.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
            || matches!(self, Self::Color(c) if c.is_empty() || c == "transparent" || c == "none")
    }

    /// Serialize to a plain value: `null`, a color string, or a filler
    /// object.
    #[must_use]
    pub fn to_object(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Color(c) => Value::from(c.clone()),
            Self::Gradient(g) => g.to_object(),
            Self::Pattern(p) => p.to_object(),
        }
    }

    /// Whether a serialized value describes a pattern (by its `source`
    /// field).
    #[must_use]
    pub fn value_is_pattern(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.contains_key("source"))
    }

    /// Whether a serialized value describes a gradient (by its color-stop
    /// list).
    #[must_use]
    pub fn value_is_gradient(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.contains_key("colorStops"))
    }

    /// Reconstruct a paint from its serialized value, using a pre-hydrated
    /// texture for patterns.
    ///
    /// This is the synchronous half of two-phase construction; pattern
    /// textures must have been loaded beforehand (see the hydration module).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedInput`] for values that are neither
    /// colors nor recognizable fillers.
    pub fn from_value(value: &Value, texture: Option<TextureData>) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::None),
            Value::String(c) => Ok(Self::Color(c.clone())),
            Value::Object(_) if Self::value_is_gradient(value) => {
                Ok(Self::Gradient(Gradient::from_object(value)?))
            }
            Value::Object(_) if Self::value_is_pattern(value) => {
                Ok(Self::Pattern(Pattern::from_object_with_texture(
                    value, texture,
                )?))
            }
            other => Err(CoreError::MalformedInput(format!(
                "unrecognized paint value: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::{ColorStop, GradientCoords};

    #[test]
    fn test_color_round_trip() {
        let paint = Paint::color("red");
        let value = paint.to_object();
        assert_eq!(value, Value::from("red"));
        assert_eq!(Paint::from_value(&value, None).expect("parse"), paint);
    }

    #[test]
    fn test_none_serializes_to_null() {
        assert_eq!(Paint::None.to_object(), Value::Null);
        assert_eq!(
            Paint::from_value(&Value::Null, None).expect("parse"),
            Paint::None
        );
    }

    #[test]
    fn test_detection_rules() {
        let gradient = Paint::Gradient(Gradient::linear(
            GradientCoords::default(),
            vec![ColorStop {
                offset: 0.0,
                color: "red".to_string(),
                opacity: None,
            }],
        ));
        let value = gradient.to_object();
        assert!(Paint::value_is_gradient(&value));
        assert!(!Paint::value_is_pattern(&value));
        assert!(matches!(
            Paint::from_value(&value, None).expect("parse"),
            Paint::Gradient(_)
        ));
    }

    #[test]
    fn test_transparent_color_is_none() {
        assert!(Paint::color("transparent").is_none());
        assert!(Paint::color("").is_none());
        assert!(!Paint::color("#fff").is_none());
    }

    #[test]
    fn test_unrecognized_value_is_malformed() {
        let value = serde_json::json!({"neither": true});
        assert!(matches!(
            Paint::from_value(&value, None),
            Err(CoreError::MalformedInput(_))
        ));
    }
}
