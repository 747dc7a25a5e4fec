//! Diagnostic sink used by every solver.
//!
//! Solvers report progress through the [`Logger`] capability instead of printing. The default
//! implementation, [`LogLogger`], forwards complete lines to the [`log`] facade so that the host
//! application decides where they go (the binaries install `env_logger`). Dropping every message
//! with [`NoLogger`] never changes numerical results.

use std::fmt;
use std::sync::{Arc, Mutex};

/// A best-effort diagnostic sink.
pub trait Logger: fmt::Debug + Send + Sync {
    /// Pushes a message at verbosity `level` (1 = coarse progress, 2 = per-step detail).
    ///
    /// When `continues` is `true` the message is a fragment of a line that will be completed
    /// by a later call.
    fn push_info(&self, message: &str, level: usize, continues: bool);

    /// Reports a condition the caller should know about, regardless of verbosity.
    fn push_warning(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Routes messages to the `log` crate: level 1 to `info!`, deeper levels to `debug!`.
#[derive(Debug, Default)]
pub struct LogLogger {
    verbosity: usize,
    pending: Mutex<String>,
}

impl LogLogger {
    pub fn new(verbosity: usize) -> Self {
        Self {
            verbosity,
            pending: Mutex::new(String::new()),
        }
    }

    pub fn verbosity(&self) -> usize {
        self.verbosity
    }
}

impl Logger for LogLogger {
    fn push_info(&self, message: &str, level: usize, continues: bool) {
        if level > self.verbosity {
            return;
        }
        // A poisoned buffer only holds diagnostics, so keep using it.
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.push_str(message);
        if continues {
            return;
        }
        let line = std::mem::take(&mut *pending);
        if level <= 1 {
            log::info!("{line}");
        } else {
            log::debug!("{line}");
        }
    }
}

/// Discards every message, warnings included.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogger;

impl Logger for NoLogger {
    fn push_info(&self, _message: &str, _level: usize, _continues: bool) {}

    fn push_warning(&self, _message: &str) {}
}

/// The logger used when a settings struct is built without one: warnings only.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(LogLogger::new(0))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every completed line and warning.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingLogger {
        pub lines: Mutex<Vec<String>>,
        pub warnings: Mutex<Vec<String>>,
        pending: Mutex<String>,
    }

    impl Logger for RecordingLogger {
        fn push_info(&self, message: &str, _level: usize, continues: bool) {
            let mut pending = self.pending.lock().unwrap();
            pending.push_str(message);
            if !continues {
                self.lines.lock().unwrap().push(std::mem::take(&mut *pending));
            }
        }

        fn push_warning(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn fragments_are_joined_into_one_line() {
        let logger = LogLogger::new(2);
        logger.push_info("a", 1, true);
        logger.push_info("b", 1, true);
        assert_eq!(*logger.pending.lock().unwrap(), "ab");
        logger.push_info("c", 1, false);
        assert!(logger.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn messages_above_verbosity_are_dropped() {
        let logger = LogLogger::new(1);
        logger.push_info("detail", 2, true);
        assert!(logger.pending.lock().unwrap().is_empty());
        assert_eq!(logger.verbosity(), 1);
    }

    #[test]
    fn recording_logger_collects_lines() {
        let logger = RecordingLogger::default();
        logger.push_info("iteration 1", 1, true);
        logger.push_info(" err = 1e-3", 1, false);
        logger.push_warning("careful");
        assert_eq!(*logger.lines.lock().unwrap(), vec!["iteration 1 err = 1e-3".to_string()]);
        assert_eq!(*logger.warnings.lock().unwrap(), vec!["careful".to_string()]);
    }
}
