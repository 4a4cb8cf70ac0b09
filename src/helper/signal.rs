use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared boolean flag, safe to raise from the sound service's completion
/// context.
///
/// Used for the host's attention signal (raised by the helper to request an
/// `idle()` pass) and for the optional per-recording done flag. Clones share
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct NotifyFlag(Arc<AtomicBool>);

impl NotifyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
