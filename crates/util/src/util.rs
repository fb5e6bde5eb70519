//! Shared utilities for toolbelt.

use std::fmt::Display;

/// Panic in debug builds, log error with backtrace in release.
///
/// Use for "this shouldn't happen" invariants that shouldn't take down
/// a running session in production.
#[macro_export]
macro_rules! debug_panic {
    ( $($fmt_arg:tt)* ) => {
        if cfg!(debug_assertions) {
            panic!( $($fmt_arg)* );
        } else {
            let backtrace = std::backtrace::Backtrace::capture();
            tracing::error!("{}\n{:?}", format_args!($($fmt_arg)*), backtrace);
        }
    };
}

/// Swallow an error after logging it.
///
/// For best-effort paths (teardown, fire-and-forget writes) where a failure
/// must never reach the caller but should still leave a trace.
pub trait ResultExt<T> {
    /// Log the error at `debug` with `context` and discard it.
    fn log_debug(self, context: &str) -> Option<T>;
}

impl<T, E: Display> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn log_debug(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!("{}: {}", context, error);
                None
            }
        }
    }
}
