#![deny(missing_docs)]
//! Shared logging utilities for the lot harvester workspace.
//!
//! Every crate logs through the `harvest_*` macros so the facade can be
//! swapped in one place. While a lot is being harvested, each message is
//! prefixed with `[lot N]`. The binary installs the real logger; tests call
//! [`initialize_for_tests`].

use std::cell::Cell;
use std::fmt;

thread_local! {
    /// Identifier currently being harvested on this thread (0 when idle).
    static CURRENT_LOT: Cell<u64> = const { Cell::new(0) };
}

/// Records the identifier the harvest loop is working on for this thread.
pub fn set_current_lot(lot: u64) {
    CURRENT_LOT.with(|v| v.set(lot));
}

/// Identifier last recorded by [`set_current_lot`], or 0.
pub fn current_lot() -> u64 {
    CURRENT_LOT.with(|v| v.get())
}

/// Formats as `[lot N] ` while [`set_current_lot`] holds a lot, and as
/// nothing otherwise.
#[doc(hidden)]
pub struct LotTag;

impl fmt::Display for LotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match current_lot() {
            0 => Ok(()),
            lot => write!(f, "[lot {lot}] "),
        }
    }
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::LotTag, format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::LotTag, format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::LotTag, format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::LotTag, format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! harvest_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::LotTag, format_args!($($arg)*));
    }};
}

/// Initializes a terminal logger for tests.
///
/// Safe to call from every test: it no-ops once a logger is installed.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Never,
    )]);
}
