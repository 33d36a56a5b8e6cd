//! Render scheduling abstraction.
//!
//! The compositor coalesces render requests through a [`RenderScheduler`]:
//! one pending handle at a time, cancelled cleanly before it fires. The
//! manually pumped implementation stands in for an animation-frame clock so
//! coalescing can be exercised deterministically in tests and host builds.

/// Opaque ticket for a scheduled render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle(u64);

/// Defers render execution to a later tick.
pub trait RenderScheduler {
    /// Request a callback slot, returning its handle.
    fn schedule(&mut self) -> RenderHandle;

    /// Cancel a scheduled handle before it fires. Unknown or already-fired
    /// handles are ignored.
    fn cancel(&mut self, handle: RenderHandle);

    /// Whether the handle's tick has fired.
    fn is_due(&self, handle: RenderHandle) -> bool;
}

/// Scheduler driven by explicit [`pump`](ManualScheduler::pump) calls.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next: u64,
    queued: Vec<u64>,
    fired: Vec<u64>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every queued handle, emulating one animation frame.
    pub fn pump(&mut self) {
        self.fired.append(&mut self.queued);
    }

    /// Number of handles waiting for the next pump.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }
}

impl RenderScheduler for ManualScheduler {
    fn schedule(&mut self) -> RenderHandle {
        self.next += 1;
        self.queued.push(self.next);
        RenderHandle(self.next)
    }

    fn cancel(&mut self, handle: RenderHandle) {
        self.queued.retain(|&id| id != handle.0);
        self.fired.retain(|&id| id != handle.0);
    }

    fn is_due(&self, handle: RenderHandle) -> bool {
        self.fired.contains(&handle.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_fires_after_pump() {
        let mut scheduler = ManualScheduler::new();
        let handle = scheduler.schedule();
        assert!(!scheduler.is_due(handle));
        scheduler.pump();
        assert!(scheduler.is_due(handle));
    }

    #[test]
    fn test_cancel_clears_pending_handle() {
        let mut scheduler = ManualScheduler::new();
        let handle = scheduler.schedule();
        scheduler.cancel(handle);
        scheduler.pump();
        assert!(!scheduler.is_due(handle));
        assert_eq!(scheduler.queued_len(), 0);
    }
}
