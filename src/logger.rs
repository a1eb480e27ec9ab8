//! Component-prefixed, level-tagged logger.
//!
//! The teacher's kernel logger prints to a serial port; this one invokes a
//! registered callback instead, because the log sink here is the host UI's
//! log pane, not a UART. Severity levels are the five the contract names:
//! Debug, Info, Warning, Error, Syscall.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Syscall,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Syscall => "SYSCALL",
        }
    }
}

pub type LogCallback = Arc<dyn Fn(LogLevel, &str, &str) + Send + Sync>;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A single callback slot shared by every component, handed out by the
/// Emulator Core so nothing needs a hidden global.
#[derive(Clone)]
pub struct Logger {
    callback: Arc<Mutex<Option<LogCallback>>>,
    min_level: LogLevel,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

impl Logger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { callback: Arc::new(Mutex::new(None)), min_level }
    }

    pub fn set_callback(&self, cb: LogCallback) {
        *self.callback.lock().unwrap() = Some(cb);
    }

    pub fn clear_callback(&self) {
        *self.callback.lock().unwrap() = None;
    }

    pub fn log(&self, level: LogLevel, component: &str, message: &str) {
        if level < self.min_level {
            return;
        }
        SEQUENCE.fetch_add(1, Ordering::Relaxed);
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(level, component, message);
        } else {
            eprintln!("[{}][{}] {}", level.as_str(), component, message);
        }
    }

    pub fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    pub fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    pub fn warning(&self, component: &str, message: &str) {
        self.log(LogLevel::Warning, component, message);
    }

    pub fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }

    pub fn syscall(&self, component: &str, message: &str) {
        self.log(LogLevel::Syscall, component, message);
    }
}
