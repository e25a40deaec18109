//! Write authorization gate.
//!
//! The gate holds the leader's [`WriteScheduler`] while this node is leader
//! and nothing otherwise. The elector is the only mutator. Request handlers
//! load it lock-free on every write; a handler may still see a scheduler that
//! was just shut down, in which case the submit fails and the write is
//! forwarded.

use crate::election::writer::WriteScheduler;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Process-local switch deciding whether this node accepts writes.
#[derive(Debug, Clone)]
pub struct WriteAuthorizationGate {
    writer: Arc<ArcSwapOption<WriteScheduler>>,
}

impl Default for WriteAuthorizationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteAuthorizationGate {
    /// Create a disabled gate.
    pub fn new() -> Self {
        Self {
            writer: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Route writes on this node to `writer`.
    pub fn enable(&self, writer: Arc<WriteScheduler>) {
        self.writer.store(Some(writer));
        tracing::info!("API will handle writes on this node");
    }

    /// Stop accepting writes. Returns the scheduler that was installed.
    pub fn disable(&self) -> Option<Arc<WriteScheduler>> {
        let previous = self.writer.swap(None);
        if previous.is_some() {
            tracing::info!("API will forward writes to leader");
        }
        previous
    }

    /// The installed scheduler, if writes are enabled.
    pub fn current(&self) -> Option<Arc<WriteScheduler>> {
        self.writer.load_full()
    }

    /// Whether writes are currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.writer.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::log::InMemoryAppendLog;

    #[tokio::test]
    async fn test_enable_disable() {
        let gate = WriteAuthorizationGate::new();
        assert!(!gate.is_enabled());
        assert!(gate.disable().is_none());

        let writer = Arc::new(WriteScheduler::new(Arc::new(InMemoryAppendLog::new()), 1));
        gate.enable(Arc::clone(&writer));
        let observer = gate.clone();
        assert!(observer.is_enabled());
        assert!(Arc::ptr_eq(&observer.current().unwrap(), &writer));

        assert!(gate.disable().is_some());
        assert!(gate.disable().is_none());
        assert!(!observer.is_enabled());
    }
}
