//! Logging interface for the bridge.
//!
//! Lifecycle components (supervisor, workers) take an injected [`Logger`] so
//! tests can observe what was reported. The default forwards to `tracing`.

use std::sync::Arc;

/// Logger interface for bridge components.
///
/// The supervisor, listener and notifier report through a `Logger` rather
/// than calling `tracing` directly. The default implementation forwards to
/// the `tracing` crate.
pub trait Logger: Send + Sync {
    fn error(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Returns the default logger that uses the `tracing` crate.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// Default logger: every message goes to `tracing` with an `acmemesh:`
/// prefix.
struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, msg: &str) {
        tracing::error!("acmemesh: {}", msg);
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("acmemesh: {}", msg);
    }

    fn info(&self, msg: &str) {
        tracing::info!("acmemesh: {}", msg);
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("acmemesh: {}", msg);
    }
}

/// No-op logger that discards all messages.
pub struct NopLogger;

impl Logger for NopLogger {
    fn error(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
}

/// Formats its arguments and logs them at error level on `$logger`.
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*))
    };
}

/// Formats its arguments and logs them at warn level on `$logger`.
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
    };
}

/// Formats its arguments and logs them at info level on `$logger`.
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
    };
}

/// Formats its arguments and logs them at debug level on `$logger`.
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
    };
}

/// Logger that keeps every message, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CapturingLogger {
    messages: parking_lot::Mutex<Vec<(&'static str, String)>>,
}

#[cfg(test)]
impl CapturingLogger {
    pub(crate) fn messages(&self) -> Vec<(&'static str, String)> {
        self.messages.lock().clone()
    }

    pub(crate) fn contains(&self, level: &str, needle: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

#[cfg(test)]
impl Logger for CapturingLogger {
    fn error(&self, msg: &str) {
        self.messages.lock().push(("error", msg.to_string()));
    }
    fn warn(&self, msg: &str) {
        self.messages.lock().push(("warn", msg.to_string()));
    }
    fn info(&self, msg: &str) {
        self.messages.lock().push(("info", msg.to_string()));
    }
    fn debug(&self, msg: &str) {
        self.messages.lock().push(("debug", msg.to_string()));
    }
}
