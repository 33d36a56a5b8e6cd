//! Class registry mapping serialized type tags to entity factories.
//!
//! Deserialization is registry-driven so applications can register custom
//! entity classes. Two namespaces exist: JSON lookup, where a missing class
//! is a hard error, and SVG lookup, where unknown elements are skipped by
//! returning `None`.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use serde_json::Value;

use crate::config::RenderConfig;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::loader::Resources;

/// A synchronous entity factory. Image sources must have been hydrated into
/// the [`Resources`] map before the factory runs.
pub type EntityFactory = fn(&Value, &Resources, &RenderConfig) -> CoreResult<Entity>;

/// Process-wide registry of entity classes.
pub struct ClassRegistry {
    json: RwLock<HashMap<String, EntityFactory>>,
    svg: RwLock<HashMap<String, EntityFactory>>,
}

impl ClassRegistry {
    fn new() -> Self {
        let registry = Self {
            json: RwLock::new(HashMap::new()),
            svg: RwLock::new(HashMap::new()),
        };
        for tag in ["rect", "ellipse", "path", "image", "text", "group"] {
            registry.set_class(tag, Entity::from_object);
        }
        for tag in ["rect", "ellipse", "path", "image", "text"] {
            registry.set_svg_class(tag, Entity::from_object);
        }
        registry
    }

    /// Register a JSON factory under the given tag and its lowercase alias.
    ///
    /// Registering twice replaces the previous factory.
    pub fn set_class(&self, tag: &str, factory: EntityFactory) {
        if let Ok(mut map) = self.json.write() {
            map.insert(tag.to_string(), factory);
            let lower = tag.to_ascii_lowercase();
            if lower != tag {
                map.entry(lower).or_insert(factory);
            }
        }
    }

    /// Register an SVG element factory.
    pub fn set_svg_class(&self, element: &str, factory: EntityFactory) {
        if let Ok(mut map) = self.svg.write() {
            map.insert(element.to_string(), factory);
        }
    }

    /// Look up a JSON factory; falls back to the lowercased tag.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClassNotFound`] for an unregistered tag.
    pub fn get_class(&self, tag: &str) -> CoreResult<EntityFactory> {
        let map = self
            .json
            .read()
            .map_err(|_| CoreError::ClassNotFound(tag.to_string()))?;
        map.get(tag)
            .or_else(|| map.get(&tag.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| CoreError::ClassNotFound(tag.to_string()))
    }

    /// Look up an SVG element factory; unknown elements yield `None` so
    /// importers can skip them.
    #[must_use]
    pub fn get_svg_class(&self, element: &str) -> Option<EntityFactory> {
        self.svg
            .read()
            .ok()
            .and_then(|map| map.get(element).copied())
    }

    /// Whether a JSON tag is registered (exact or lowercase).
    #[must_use]
    pub fn has(&self, tag: &str) -> bool {
        self.json.read().is_ok_and(|map| {
            map.contains_key(tag) || map.contains_key(&tag.to_ascii_lowercase())
        })
    }
}

/// The process-wide registry, initialized with the built-in classes on
/// first use.
#[must_use]
pub fn class_registry() -> &'static ClassRegistry {
    static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ClassRegistry::new)
}
