use std::sync::Arc;

use rt_ui_log::UiLogger;
use tokio::sync::broadcast;

/// One formatted debug line (SPEC_FULL §3.1): the `toggle-debug` CLI
/// command subscribes to these rather than raw `tracing` output, so it
/// keeps working the same way whether or not a `tracing` subscriber is
/// attached to a terminal.
#[derive(Debug, Clone)]
pub struct DebugLine(pub String);

pub type DebugLogger = UiLogger<DebugLine>;

/// Builds a ring-buffered debug logger and a receiver for an initial
/// subscriber (e.g. a CLI console toggled on at startup).
pub fn new_debug_logger(buffer_entries: usize) -> (Arc<DebugLogger>, broadcast::Receiver<DebugLine>) {
    let (tx, rx) = broadcast::channel(buffer_entries.max(16));
    let logger = Arc::new(UiLogger::with_buffer(tx, DebugLine, buffer_entries));
    (logger, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_logger_buffers_and_broadcasts_lines() {
        let (logger, mut rx) = new_debug_logger(2);
        logger.log("relay: gate acquired for r1");
        logger.log("relay: gate released");
        logger.log("relay: session attached");

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].ends_with("session attached"));

        let first = rx.try_recv().unwrap();
        assert!(first.0.ends_with("gate acquired for r1"));
    }
}
