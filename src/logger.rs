//! Logging utilities with colored output.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro, only printed when verbose mode is enabled
//! - `debug_do!` for guarding expensive debug-only computations
//!
//! # Example
//!
//! ```ignore
//! log!("populate"; "{} assets, {} relations", assets, relations);
//! debug!("css"; "rewrote {} -> {}", old, new);
//! ```

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::io::{Write, stderr, stdout};
use std::sync::atomic::{AtomicBool, Ordering};

/// Global verbose flag (set from `GraphConfig::verbose`)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Global quiet flag, suppresses everything except errors and warnings
static QUIET: AtomicBool = AtomicBool::new(false);

/// Serializes writes so concurrent tasks never interleave a line.
static OUTPUT: Mutex<()> = Mutex::new(());

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Set quiet mode globally
pub fn set_quiet(q: bool) {
    QUIET.store(q, Ordering::SeqCst);
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when verbose mode is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Execute code only when verbose mode is enabled
///
/// # Usage
/// ```ignore
/// debug_do! {
///     let summary = graph.summary();
///     debug!("graph"; "{}", summary);
/// }
/// ```
#[macro_export]
macro_rules! debug_do {
    ($($body:tt)*) => {{
        if $crate::logger::is_verbose() {
            $($body)*
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
///
/// Warnings and errors go to stderr and ignore quiet mode.
#[inline]
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let is_problem = matches!(module_lower.as_str(), "error" | "warning");
    if !is_problem && QUIET.load(Ordering::SeqCst) {
        return;
    }

    let prefix = colorize_prefix(module, &module_lower);
    let _guard = OUTPUT.lock();

    if is_problem {
        let mut out = stderr().lock();
        writeln!(out, "{prefix} {message}").ok();
        out.flush().ok();
    } else {
        let mut out = stdout().lock();
        writeln!(out, "{prefix} {message}").ok();
        out.flush().ok();
    }
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    match module_lower {
        "populate" | "load" => prefix.bright_blue().bold().to_string(),
        "pipeline" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        "warning" => prefix.yellow().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_contains_module() {
        let prefix = colorize_prefix("populate", "populate");
        assert!(prefix.contains("[populate]"));

        let prefix = colorize_prefix("Custom", "custom");
        assert!(prefix.contains("[Custom]"));
    }
}
