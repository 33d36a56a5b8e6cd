//! # Easel Core
//!
//! Data model for a 2D scene graph: drawable entities with transforms,
//! styling, fillers, and caching state, plus JSON round-trip serialization
//! through a registry of entity classes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 easel-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Scene Graph     │  Serialization           │
//! │  - Entities      │  - Plain-object I/O      │
//! │  - Transforms    │  - Class registry        │
//! │  - Fillers       │  - Async hydration       │
//! ├─────────────────────────────────────────────┤
//! │  Resources       │  Scheduling              │
//! │  - Image loading │  - Coalesced renders     │
//! │  - Abort signals │  - Dirty tracking        │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod abort;
pub mod color;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod gradient;
pub mod hydrate;
pub mod loader;
pub mod matrix;
pub mod paint;
pub mod pattern;
pub mod registry;
pub mod scheduler;
pub mod shadow;
pub mod shapes;

pub use abort::{AbortController, AbortSignal};
pub use color::{parse_color, try_parse_color, Rgba};
pub use config::RenderConfig;
pub use entity::{
    ClipPath, Entity, EntityKind, FillRuleKind, LineCap, LineJoin, OriginX, OriginY, PaintFirst,
    Prop, StrokeStyle,
};
pub use error::{CoreError, CoreResult};
pub use event::{CanvasEvent, EventHandler};
pub use gradient::{ColorStop, Gradient, GradientCoords, GradientKind, GradientUnits};
pub use hydrate::{clone_entity, enliven_objects, hydrate};
pub use loader::{load_image, LoadImageOptions, Resources, SourceFormat, TextureData};
pub use paint::Paint;
pub use pattern::{Pattern, RepeatMode};
pub use registry::{class_registry, ClassRegistry, EntityFactory};
pub use scheduler::{ManualScheduler, RenderHandle, RenderScheduler};
pub use shadow::Shadow;

/// Scene description format version written into serialized scenes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
