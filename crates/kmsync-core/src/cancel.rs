//! Cooperative cancellation token.
//!
//! The engine has no async runtime, so "suspension points accept a
//! cancellation token" is modeled as a plain boolean flag checked between
//! scan entries, hash chunks, and CAS puts. Cancelling lets any in-flight
//! CAS put finish (so no temp file leaks) but stops further work before the
//! session tip advances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{KmsyncError, Result};

#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` if cancellation has been requested; intended
    /// to be called at each cooperative suspension point.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(KmsyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}
