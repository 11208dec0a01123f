//! Current-channel context for the tracing bridge
//!
//! Thread-local storage of the channel that tracing events on this thread
//! belong to. [`BufferLayer`](crate::BufferLayer) routes events to it.

use std::cell::Cell;
use std::marker::PhantomData;

use tributary_core::ChannelId;

thread_local! {
    static CURRENT_CHANNEL: Cell<Option<ChannelId>> = const { Cell::new(None) };
}

/// RAII guard for the current channel
///
/// Sets the channel for the current thread on creation and restores the
/// previous one (if any) on drop. Not `Send`: it must be dropped on the
/// thread that created it.
///
/// # Example
///
/// ```ignore
/// use tributary_logging::ChannelContextGuard;
///
/// let _guard = ChannelContextGuard::new(stage.id());
///
/// // Bridged into the event buffer under `stage`
/// tracing::info!(rows = 120, "Batch written");
/// ```
pub struct ChannelContextGuard {
    previous: Option<ChannelId>,
    _not_send: PhantomData<*const ()>,
}

impl ChannelContextGuard {
    /// Make `channel` current for this thread
    pub fn new(channel: ChannelId) -> Self {
        let previous = CURRENT_CHANNEL.with(|current| current.replace(Some(channel)));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }

    /// The current channel (if any)
    pub fn current() -> Option<ChannelId> {
        CURRENT_CHANNEL.with(Cell::get)
    }
}

impl Drop for ChannelContextGuard {
    fn drop(&mut self) {
        CURRENT_CHANNEL.with(|current| current.set(self.previous));
    }
}

/// Run a block with a channel made current
///
/// # Example
///
/// ```ignore
/// with_channel_context!(stage.id(), {
///     tracing::info!("Processing batch");
/// });
/// ```
#[macro_export]
macro_rules! with_channel_context {
    ($channel:expr, $body:block) => {{
        let _guard = $crate::context::ChannelContextGuard::new($channel);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_context_guard() {
        assert!(ChannelContextGuard::current().is_none());

        let id = ChannelId::new();
        {
            let _guard = ChannelContextGuard::new(id);
            assert_eq!(ChannelContextGuard::current(), Some(id));
        }

        assert!(ChannelContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let outer = ChannelId::new();
        let inner = ChannelId::new();

        {
            let _outer = ChannelContextGuard::new(outer);
            {
                let _inner = ChannelContextGuard::new(inner);
                assert_eq!(ChannelContextGuard::current(), Some(inner));
            }
            // Restored after the inner guard drops
            assert_eq!(ChannelContextGuard::current(), Some(outer));
        }

        assert!(ChannelContextGuard::current().is_none());
    }

    #[test]
    fn test_macro() {
        let id = ChannelId::new();
        let seen = crate::with_channel_context!(id, { ChannelContextGuard::current() });
        assert_eq!(seen, Some(id));
        assert!(ChannelContextGuard::current().is_none());
    }
}
