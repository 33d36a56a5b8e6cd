//! # Easel Renderer
//!
//! Compositing layer for the easel scene graph: a backend-agnostic
//! [`Painter`] trait, a CPU rasterizer on `tiny-skia`, per-entity cache
//! bitmaps, and a static canvas that ties membership, viewport, and render
//! scheduling together with SVG and raster export.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               easel-renderer                │
//! ├─────────────────────────────────────────────┤
//! │  Compositing     │  Backends                │
//! │  - StaticCanvas  │  - PixmapPainter (CPU)   │
//! │  - Entity draw   │  - RecordingPainter      │
//! │  - Cache bitmaps │                          │
//! ├─────────────────────────────────────────────┤
//! │  Export          │  Effects                 │
//! │  - SVG documents │  - Shadow blur           │
//! │  - PNG/JPEG      │  - Composite operations  │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blur;
pub mod cache;
pub mod canvas;
pub mod draw;
pub mod error;
pub mod export;
pub mod painter;
pub mod pixmap;
pub mod recording;

pub use blur::gaussian_blur;
pub use cache::{CacheManager, CacheStats};
pub use canvas::{LoadOptions, StaticCanvas};
pub use draw::{draw_entity_content, render_entity};
pub use error::{RenderError, RenderResult};
pub use export::{rasterize_entity, RasterOptions, SvgOptions, SvgReviver};
pub use painter::{CompositeOp, Painter};
pub use pixmap::PixmapPainter;
pub use recording::{RecordedOp, RecordingPainter};

/// Crate version, for canvas serialization stamps.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
