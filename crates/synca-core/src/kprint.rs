//! Kernel-style print macros for synca
//!
//! Thread-safe, optionally-flushing diagnostic output on stderr. Every
//! leveled line is prefixed with the emitting thread's tag (`name#number`,
//! set by pool workers) and, when a coroutine is running on that thread,
//! its id.
//!
//! # Environment Variables
//!
//! - `SYNCA_FLUSH_EPRINT=1` - Flush stderr after each print (useful for debugging crashes)
//! - `SYNCA_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!
//! # Usage
//!
//! ```ignore
//! use synca_core::{kdebug, kinfo, kwarn};
//!
//! kinfo!("pool {} started with {} threads", name, n);
//! kdebug!("resume scheduled for {}", id);
//! kwarn!("dropping started coroutine {}", id);
//! ```

use crate::id::CoroId;
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit, as accepted by `SYNCA_LOG_LEVEL`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
/// Level used until `SYNCA_LOG_LEVEL` says otherwise, or when it does not parse
const DEFAULT_LEVEL: LogLevel = LogLevel::Warn;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LEVEL as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

thread_local! {
    /// `name#number` of the current thread, set by pool workers
    static THREAD_TAG: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Coroutine currently running on this thread (NONE outside coroutines)
    static CORO_ID: Cell<CoroId> = const { Cell::new(CoroId::NONE) };
}

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("SYNCA_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("SYNCA_LOG_LEVEL") {
        LOG_LEVEL.store(level_from_env(&val) as u8, Ordering::Relaxed);
    }
}

fn level_from_env(val: &str) -> LogLevel {
    LogLevel::parse(val).unwrap_or(DEFAULT_LEVEL)
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides the environment)
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Tag the current OS thread as `name#number` in log output
pub fn set_thread_tag(name: &str, number: usize) {
    THREAD_TAG.with(|t| *t.borrow_mut() = Some(format!("{}#{}", name, number)));
}

pub fn clear_thread_tag() {
    THREAD_TAG.with(|t| *t.borrow_mut() = None);
}

/// Record which coroutine is running on this thread (for log prefixes)
#[inline]
pub fn set_coro_id(id: CoroId) -> CoroId {
    CORO_ID.with(|c| c.replace(id))
}

fn write_context(handle: &mut impl Write) {
    THREAD_TAG.with(|t| match t.borrow().as_deref() {
        Some(tag) => {
            let _ = write!(handle, "{}", tag);
        }
        None => {
            let current = std::thread::current();
            let _ = write!(handle, "{}#0", current.name().unwrap_or("thread"));
        }
    });
    let id = CORO_ID.with(|c| c.get());
    if id.is_some() {
        let _ = write!(handle, " {}", id);
    }
    let _ = handle.write_all(b": ");
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    write_context(&mut handle);
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::kprint::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print to stderr with newline
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::$level, format_args!($($arg)*));
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" WARN "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("verbose"), None);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_bad_env_level_keeps_default() {
        assert_eq!(level_from_env("verbose"), DEFAULT_LEVEL);
        assert_eq!(level_from_env(""), LogLevel::Warn);
        assert_eq!(level_from_env("info"), LogLevel::Info);
    }

    #[test]
    fn test_context_prefix() {
        set_thread_tag("net", 2);
        let prev = set_coro_id(CoroId::new(9));
        let mut buf = Vec::new();
        write_context(&mut buf);
        assert_eq!(String::from_utf8(buf).unwrap(), "net#2 coro-9: ");

        set_coro_id(prev);
        clear_thread_tag();
        let mut buf = Vec::new();
        write_context(&mut buf);
        assert!(String::from_utf8(buf).unwrap().ends_with("#0: "));
    }

    #[test]
    fn test_macros_compile() {
        set_log_level(LogLevel::Off);
        kprint!("");
        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug");
        ktrace!("trace");
    }
}
