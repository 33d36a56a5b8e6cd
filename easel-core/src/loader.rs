//! Image loading for pattern and image-entity hydration.
//!
//! Supports data URIs, filesystem paths, and raw byte buffers. Loading is
//! promise-shaped: `async` entry points observe an optional abort signal and
//! reject with [`CoreError::Aborted`] once it fires.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::abort::{check_signal, AbortSignal};
use crate::error::{CoreError, CoreResult};

/// Pre-loaded textures keyed by source reference.
///
/// Hydration fills this map from the image sources a scene description
/// mentions; synchronous entity construction then looks textures up here
/// instead of performing I/O.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    textures: HashMap<String, TextureData>,
}

impl Resources {
    /// Insert a decoded texture under its source reference.
    pub fn insert_texture(&mut self, source: impl Into<String>, texture: TextureData) {
        self.textures.insert(source.into(), texture);
    }

    /// Look up a texture by source reference.
    #[must_use]
    pub fn texture(&self, source: &str) -> Option<&TextureData> {
        self.textures.get(source)
    }

    /// Number of loaded textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no textures have been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Decoded RGBA texture ready for drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA pixel data, 4 bytes per pixel.
    pub data: Vec<u8>,
    /// Original encoded format.
    pub format: SourceFormat,
}

/// Encoded image formats recognized by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl SourceFormat {
    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }
        Self::Unknown
    }
}

/// Options for [`load_image`].
#[derive(Debug, Clone, Default)]
pub struct LoadImageOptions {
    /// Abort signal observed before and after the decode.
    pub signal: Option<AbortSignal>,
    /// Cross-origin hint, recorded on image entities for serialization.
    pub cross_origin: Option<String>,
}

/// Decode an image from raw bytes.
///
/// # Errors
///
/// Returns [`CoreError::ResourceLoad`] if the bytes cannot be decoded.
pub fn load_image_from_bytes(data: &[u8]) -> CoreResult<TextureData> {
    let format = SourceFormat::from_magic_bytes(data);
    let img = image::load_from_memory(data)
        .map_err(|e| CoreError::ResourceLoad(format!("Failed to decode image: {e}")))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TextureData {
        width,
        height,
        data: rgba.into_raw(),
        format,
    })
}

/// Decode an image from a base64 data URI.
///
/// Supports forms like `data:image/png;base64,iVBORw0KGgo...`.
///
/// # Errors
///
/// Returns [`CoreError::ResourceLoad`] if the URI is malformed or the
/// payload cannot be decoded.
pub fn load_image_from_data_uri(uri: &str) -> CoreResult<TextureData> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CoreError::ResourceLoad("Not a data URI".to_string()))?;
    let comma = rest
        .find(',')
        .ok_or_else(|| CoreError::ResourceLoad("Malformed data URI".to_string()))?;
    let (meta, payload) = rest.split_at(comma);
    let payload = &payload[1..];
    if !meta.ends_with(";base64") {
        return Err(CoreError::ResourceLoad(
            "Only base64 data URIs are supported".to_string(),
        ));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CoreError::ResourceLoad(format!("Invalid base64 payload: {e}")))?;
    load_image_from_bytes(&bytes)
}

/// Load an image from a data URI or filesystem path.
///
/// # Errors
///
/// Returns [`CoreError::Aborted`] when the signal fires, or
/// [`CoreError::ResourceLoad`] when reading or decoding fails.
pub async fn load_image(src: &str, options: &LoadImageOptions) -> CoreResult<TextureData> {
    check_signal(options.signal.as_ref())?;
    let texture = if src.starts_with("data:") {
        load_image_from_data_uri(src)?
    } else {
        let bytes = std::fs::read(src)
            .map_err(|e| CoreError::ResourceLoad(format!("Failed to read {src}: {e}")))?;
        load_image_from_bytes(&bytes)?
    };
    // The decode itself cannot be interrupted; honor an abort that landed
    // while it ran instead of committing the result.
    check_signal(options.signal.as_ref())?;
    Ok(texture)
}
