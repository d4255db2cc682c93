//! Rate limiting for high-frequency presence updates.

use crate::clock::Millis;

/// Admits at most one update per window, measured from the last admitted
/// operation. Other local operations can advance the window with [`mark`].
///
/// [`mark`]: CursorThrottle::mark
#[derive(Debug, Clone)]
pub struct CursorThrottle {
    window: Millis,
    last_operation: Option<Millis>,
}

impl CursorThrottle {
    pub fn new(window: Millis) -> Self {
        Self {
            window: window.max(0.0),
            last_operation: None,
        }
    }

    /// Returns true and restarts the window if an update is allowed at `now`.
    pub fn try_acquire(&mut self, now: Millis) -> bool {
        let allowed = self
            .last_operation
            .is_none_or(|last| now - last >= self.window);
        if allowed {
            self.last_operation = Some(now);
        }
        allowed
    }

    /// Record an operation at `now` without asking for admission.
    pub fn mark(&mut self, now: Millis) {
        self.last_operation = Some(now);
    }

    pub fn last_operation(&self) -> Option<Millis> {
        self.last_operation
    }
}
