//! Per-device diagnostic output
//!
//! Drivers report status chatter, warnings and data-path markers through a
//! [`DiagnosticSink`] owned by the device handle, so several devices can
//! coexist without sharing process-wide handler state.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

/// Category of a driver message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Status,
    Warning,
    Error,
    /// Single-character data-path markers (`O` overflow, `L` late command, ...).
    FastPath,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Status => "status",
            MessageKind::Warning => "warning",
            MessageKind::Error => "error",
            MessageKind::FastPath => "fastpath",
        };
        f.write_str(s)
    }
}

/// Receiver for driver diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn message(&self, kind: MessageKind, text: &str);
}

/// Default sink: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn message(&self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Status => info!(target: "spectrum_rx::driver", "{}", text),
            MessageKind::Warning => warn!(target: "spectrum_rx::driver", "{}", text),
            MessageKind::Error => error!(target: "spectrum_rx::driver", "{}", text),
            MessageKind::FastPath => debug!(target: "spectrum_rx::driver", "fastpath {}", text),
        }
    }
}

/// Sink that keeps every message, for inspection in tests and tools.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<(MessageKind, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(MessageKind, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.messages()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl DiagnosticSink for CollectingSink {
    fn message(&self, kind: MessageKind, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((kind, text.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.message(MessageKind::Warning, "clipped");
        sink.message(MessageKind::FastPath, "O");
        sink.message(MessageKind::FastPath, "O");
        assert_eq!(sink.count(MessageKind::FastPath), 2);
        assert_eq!(sink.messages()[0], (MessageKind::Warning, "clipped".to_string()));
    }
}
