//! Canvas lifecycle events.

use uuid::Uuid;

/// Events emitted by the compositor around membership and render passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    /// An entity was added to the canvas at `index`.
    ObjectAdded {
        /// Id of the added entity.
        id: Uuid,
        /// Position in paint order.
        index: usize,
    },
    /// An entity was removed from the canvas.
    ObjectRemoved {
        /// Id of the removed entity.
        id: Uuid,
    },
    /// A render pass is about to start.
    BeforeRender,
    /// A render pass finished.
    AfterRender,
    /// All entities were removed at once.
    CanvasCleared,
}

/// Callback invoked for every emitted [`CanvasEvent`].
pub type EventHandler = Box<dyn Fn(&CanvasEvent)>;
