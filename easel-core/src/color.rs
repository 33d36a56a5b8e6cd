//! CSS color parsing.
//!
//! Supports hex (`#rgb`, `#rrggbb`, `#rrggbbaa`), `rgb()`/`rgba()` notation,
//! `transparent`, and a small set of named colors. Unknown strings parse as
//! opaque black so a bad color never aborts a render pass.

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (255 = opaque).
    pub a: u8,
}

impl Rgba {
    /// Opaque black.
    pub const BLACK: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };

    /// Fully transparent.
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Whether the color contributes any ink.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.a > 0
    }
}

/// Parse a CSS color string, falling back to opaque black.
#[must_use]
pub fn parse_color(input: &str) -> Rgba {
    try_parse_color(input).unwrap_or(Rgba::BLACK)
}

/// Parse a CSS color string.
#[must_use]
pub fn try_parse_color(input: &str) -> Option<Rgba> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("rgb") {
        return parse_rgb_function(&lower);
    }
    named_color(&lower)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_hex(hex: &str) -> Option<Rgba> {
    let expand = |c: u8| c * 16 + c;
    match hex.len() {
        3 | 4 => {
            let mut chans = [0_u8; 4];
            for (i, c) in hex.chars().enumerate() {
                chans[i] = expand(c.to_digit(16)? as u8);
            }
            let a = if hex.len() == 4 { chans[3] } else { 255 };
            Some(Rgba {
                r: chans[0],
                g: chans[1],
                b: chans[2],
                a,
            })
        }
        6 | 8 => {
            let mut chans = [0_u8; 4];
            for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
                let text = std::str::from_utf8(pair).ok()?;
                chans[i] = u8::from_str_radix(text, 16).ok()?;
            }
            let a = if hex.len() == 8 { chans[3] } else { 255 };
            Some(Rgba {
                r: chans[0],
                g: chans[1],
                b: chans[2],
                a,
            })
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_rgb_function(lower: &str) -> Option<Rgba> {
    let open = lower.find('(')?;
    let close = lower.rfind(')')?;
    let parts: Vec<&str> = lower
        .get(open + 1..close)?
        .split(',')
        .map(str::trim)
        .collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |text: &str| -> Option<u8> {
        if let Some(pct) = text.strip_suffix('%') {
            let v: f64 = pct.trim().parse().ok()?;
            Some((v.clamp(0.0, 100.0) * 2.55).round() as u8)
        } else {
            let v: f64 = text.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if parts.len() > 3 {
        let v: f64 = parts[3].parse().ok()?;
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    } else {
        255
    };
    Some(Rgba { r, g, b, a })
}

fn named_color(lower: &str) -> Option<Rgba> {
    let (r, g, b, a) = match lower {
        "transparent" | "none" => (0, 0, 0, 0),
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 128, 0, 255),
        "lime" => (0, 255, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" | "aqua" => (0, 255, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        "silver" => (192, 192, 192, 255),
        "maroon" => (128, 0, 0, 255),
        "navy" => (0, 0, 128, 255),
        "olive" => (128, 128, 0, 255),
        "orange" => (255, 165, 0, 255),
        "purple" => (128, 0, 128, 255),
        "teal" => (0, 128, 128, 255),
        _ => return None,
    };
    Some(Rgba { r, g, b, a })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_forms() {
        assert_eq!(
            parse_color("#f00"),
            Rgba {
                r: 255,
                g: 0,
                b: 0,
                a: 255
            }
        );
        assert_eq!(
            parse_color("#00ff00"),
            Rgba {
                r: 0,
                g: 255,
                b: 0,
                a: 255
            }
        );
        assert_eq!(parse_color("#00000080").a, 128);
    }

    #[test]
    fn test_rgb_functions() {
        assert_eq!(
            parse_color("rgb(10, 20, 30)"),
            Rgba {
                r: 10,
                g: 20,
                b: 30,
                a: 255
            }
        );
        assert_eq!(parse_color("rgba(0, 0, 0, 0.5)").a, 128);
        assert_eq!(parse_color("rgb(100%, 0%, 0%)").r, 255);
    }

    #[test]
    fn test_named_and_fallback() {
        assert_eq!(parse_color("red").r, 255);
        assert_eq!(parse_color("transparent").a, 0);
        assert!(!parse_color("transparent").is_visible());
        assert_eq!(parse_color("definitely-not-a-color"), Rgba::BLACK);
        assert!(try_parse_color("definitely-not-a-color").is_none());
    }
}
