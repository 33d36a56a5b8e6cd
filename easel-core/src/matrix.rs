//! 2×3 affine matrix utilities.
//!
//! Matrices follow the canvas `matrix(a, b, c, d, e, f)` convention and are
//! represented as [`kurbo::Affine`]: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.

use kurbo::{Affine, Point, Rect, Vec2};

/// Options describing a full object transform, in application order
/// translate → rotate → skew → scale (flips folded into scale sign).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformOptions {
    /// Horizontal translation.
    pub translate_x: f64,
    /// Vertical translation.
    pub translate_y: f64,
    /// Rotation angle in degrees.
    pub angle: f64,
    /// Horizontal scale factor (always positive, see `flip_x`).
    pub scale_x: f64,
    /// Vertical scale factor (always positive, see `flip_y`).
    pub scale_y: f64,
    /// Horizontal skew angle in degrees.
    pub skew_x: f64,
    /// Vertical skew angle in degrees.
    pub skew_y: f64,
    /// Mirror around the vertical axis.
    pub flip_x: bool,
    /// Mirror around the horizontal axis.
    pub flip_y: bool,
}

/// A transform matrix broken back into its components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    /// Rotation angle in degrees.
    pub angle: f64,
    /// Horizontal scale magnitude.
    pub scale_x: f64,
    /// Vertical scale magnitude.
    pub scale_y: f64,
    /// Horizontal skew angle in degrees.
    pub skew_x: f64,
    /// Horizontal translation.
    pub translate_x: f64,
    /// Vertical translation.
    pub translate_y: f64,
}

/// Multiply two matrices; the result applies `b` first, then `a`.
#[must_use]
pub fn multiply(a: Affine, b: Affine) -> Affine {
    a * b
}

/// Invert a matrix, returning `None` when it is degenerate.
#[must_use]
pub fn invert(m: Affine) -> Option<Affine> {
    if m.determinant().abs() < f64::EPSILON {
        None
    } else {
        Some(m.inverse())
    }
}

/// Apply a matrix to a point.
#[must_use]
pub fn transform_point(m: Affine, x: f64, y: f64) -> Point {
    m * Point::new(x, y)
}

/// Compose a matrix from translation, rotation, skew, scale, and flips.
#[must_use]
pub fn compose(options: &TransformOptions) -> Affine {
    let mut m = Affine::translate(Vec2::new(options.translate_x, options.translate_y));
    if options.angle != 0.0 {
        m *= Affine::rotate(options.angle.to_radians());
    }
    if options.skew_x != 0.0 {
        m *= Affine::new([1.0, 0.0, options.skew_x.to_radians().tan(), 1.0, 0.0, 0.0]);
    }
    if options.skew_y != 0.0 {
        m *= Affine::new([1.0, options.skew_y.to_radians().tan(), 0.0, 1.0, 0.0, 0.0]);
    }
    let sx = if options.flip_x {
        -options.scale_x
    } else {
        options.scale_x
    };
    let sy = if options.flip_y {
        -options.scale_y
    } else {
        options.scale_y
    };
    if sx != 1.0 || sy != 1.0 {
        m *= Affine::scale_non_uniform(sx, sy);
    }
    m
}

/// Break a matrix into angle, scale, skew, and translation components.
#[must_use]
pub fn decompose(m: Affine) -> DecomposedTransform {
    let [a, b, c, d, e, f] = m.as_coeffs();
    let angle = b.atan2(a);
    let denom = a * a + b * b;
    let scale_x = denom.sqrt();
    let scale_y = if scale_x.abs() < f64::EPSILON {
        0.0
    } else {
        (a * d - c * b) / scale_x
    };
    let skew_x = (a * c + b * d).atan2(denom);
    DecomposedTransform {
        angle: angle.to_degrees(),
        scale_x,
        scale_y,
        skew_x: skew_x.to_degrees(),
        translate_x: e,
        translate_y: f,
    }
}

/// Scale factors a matrix applies along its two columns.
///
/// Used by the cache sizing policy to measure the total on-screen scaling of
/// an object, independent of rotation.
#[must_use]
pub fn total_scale(m: Affine) -> (f64, f64) {
    let [a, b, c, d, _, _] = m.as_coeffs();
    ((a * a + b * b).sqrt(), (c * c + d * d).sqrt())
}

/// Axis-aligned bounding box of a rectangle mapped through a matrix.
#[must_use]
pub fn transformed_bounds(m: Affine, rect: Rect) -> Rect {
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for corner in corners {
        let p = m * corner;
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::new(min_x, min_y, max_x, max_y)
}

/// Format a matrix as an SVG `matrix(a b c d e f)` attribute value.
#[must_use]
pub fn to_svg_attribute(m: Affine, fraction_digits: u32) -> String {
    let factor = 10_f64.powi(i32::try_from(fraction_digits.min(12)).unwrap_or(12));
    let rounded: Vec<String> = m
        .as_coeffs()
        .iter()
        .map(|v| ((v * factor).round() / factor).to_string())
        .collect();
    format!("matrix({})", rounded.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_compose_translation_only() {
        let m = compose(&TransformOptions {
            translate_x: 10.0,
            translate_y: -4.0,
            scale_x: 1.0,
            scale_y: 1.0,
            ..Default::default()
        });
        let p = transform_point(m, 0.0, 0.0);
        assert_close(p.x, 10.0);
        assert_close(p.y, -4.0);
    }

    #[test]
    fn test_compose_then_decompose_round_trips() {
        let options = TransformOptions {
            translate_x: 5.0,
            translate_y: 7.0,
            angle: 30.0,
            scale_x: 2.0,
            scale_y: 3.0,
            ..Default::default()
        };
        let d = decompose(compose(&options));
        assert_close(d.angle, 30.0);
        assert_close(d.scale_x, 2.0);
        assert_close(d.scale_y, 3.0);
        assert_close(d.translate_x, 5.0);
        assert_close(d.translate_y, 7.0);
    }

    #[test]
    fn test_invert_round_trips_points() {
        let m = compose(&TransformOptions {
            translate_x: 3.0,
            translate_y: 4.0,
            angle: 45.0,
            scale_x: 2.0,
            scale_y: 2.0,
            ..Default::default()
        });
        let inv = invert(m).expect("invertible");
        let p = transform_point(multiply(inv, m), 11.0, 13.0);
        assert_close(p.x, 11.0);
        assert_close(p.y, 13.0);
    }

    #[test]
    fn test_invert_degenerate_is_none() {
        let m = Affine::new([0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
        assert!(invert(m).is_none());
    }

    #[test]
    fn test_total_scale_ignores_rotation() {
        let m = compose(&TransformOptions {
            angle: 63.0,
            scale_x: 2.0,
            scale_y: 5.0,
            ..Default::default()
        });
        let (sx, sy) = total_scale(m);
        assert_close(sx, 2.0);
        assert_close(sy, 5.0);
    }

    #[test]
    fn test_transformed_bounds_of_rotated_square() {
        let m = compose(&TransformOptions {
            angle: 45.0,
            scale_x: 1.0,
            scale_y: 1.0,
            ..Default::default()
        });
        let bounds = transformed_bounds(m, Rect::new(-1.0, -1.0, 1.0, 1.0));
        let diag = 2.0_f64.sqrt();
        assert_close(bounds.width(), 2.0 * diag);
        assert_close(bounds.height(), 2.0 * diag);
    }

    #[test]
    fn test_svg_attribute_formatting() {
        let m = Affine::new([1.0, 0.0, 0.0, 1.0, 10.123_456, 0.0]);
        assert_eq!(to_svg_attribute(m, 2), "matrix(1 0 0 1 10.12 0)");
    }
}
