//! Cooperative cancellation for long-running hydration.
//!
//! A controller owns the flag; signals are cheap clones handed to the
//! operations that should observe it. Aborting is sticky and idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// Owner side of an abort flag.
#[derive(Debug, Default)]
pub struct AbortController {
    flag: Arc<AtomicBool>,
}

impl AbortController {
    /// Create a controller with an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Fire the abort flag.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Observer side of an abort flag.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Whether the controller has fired.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail fast when the controller has fired.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Aborted`] when the signal has fired.
    pub fn check(&self) -> CoreResult<()> {
        if self.aborted() {
            Err(CoreError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Check an optional signal, treating `None` as never-aborted.
///
/// # Errors
///
/// Returns [`CoreError::Aborted`] when a present signal has fired.
pub fn check_signal(signal: Option<&AbortSignal>) -> CoreResult<()> {
    match signal {
        Some(s) => s.check(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_observes_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.aborted());
        assert!(signal.check().is_ok());

        controller.abort();
        assert!(signal.aborted());
        assert!(matches!(signal.check(), Err(CoreError::Aborted)));
    }

    #[test]
    fn test_missing_signal_never_aborts() {
        assert!(check_signal(None).is_ok());
    }
}
