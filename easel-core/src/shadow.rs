//! Drop shadow declaration.

use serde::{Deserialize, Serialize};

/// Shadow parameters attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
    /// Shadow color as a CSS color string.
    pub color: String,
    /// Blur radius in logical pixels.
    pub blur: f64,
    /// Horizontal offset in logical pixels.
    #[serde(rename = "offsetX")]
    pub offset_x: f64,
    /// Vertical offset in logical pixels.
    #[serde(rename = "offsetY")]
    pub offset_y: f64,
    /// Whether the shadow follows the stroke in addition to the fill.
    #[serde(default)]
    pub affect_stroke: bool,
    /// When set, blur and offsets ignore the object's own scaling.
    #[serde(default)]
    pub non_scaling: bool,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            color: "rgb(0,0,0)".to_string(),
            blur: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            affect_stroke: false,
            non_scaling: false,
        }
    }
}

impl Shadow {
    /// Blur and offsets scaled by the object/viewport scaling in effect.
    ///
    /// Shadows must visually track the rendered size of the object, not its
    /// logical size, unless flagged non-scaling.
    #[must_use]
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Self {
        if self.non_scaling {
            return self.clone();
        }
        let uniform = (scale_x + scale_y) / 2.0;
        Self {
            color: self.color.clone(),
            blur: self.blur * uniform,
            offset_x: self.offset_x * scale_x,
            offset_y: self.offset_y * scale_y,
            affect_stroke: self.affect_stroke,
            non_scaling: self.non_scaling,
        }
    }
}
