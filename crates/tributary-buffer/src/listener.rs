//! Synchronous append listeners

use std::fmt;

use tributary_core::LogEvent;

/// Callback invoked on every successful append
///
/// Listeners run synchronously on the appending thread, in registration
/// order, before `append` returns. Keep them short. A listener that panics
/// is isolated: the append still completes and later listeners still run.
pub trait EventListener: Send + Sync {
    /// Handle one appended event
    fn on_event(&self, event: &LogEvent);
}

impl<F> EventListener for F
where
    F: Fn(&LogEvent) + Send + Sync,
{
    fn on_event(&self, event: &LogEvent) {
        self(event)
    }
}

/// Handle returned by `add_listener`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
