//! # Logging.

use crate::context::Context;

/// Logs an info message to the context's event channel.
#[macro_export]
macro_rules! info {
    ($ctx:expr,  $msg:expr) => {
        $crate::info!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        let full = format!("{file}:{line}: {msg}",
                           file = file!(),
                           line = line!(),
                           msg = &formatted);
        $ctx.emit_event($crate::events::EventType::Info(full));
    }};
}

/// Logs a warning message to the context's event channel.
#[macro_export]
macro_rules! warn {
    ($ctx:expr, $msg:expr) => {
        $crate::warn!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        let full = format!("{file}:{line}: {msg}",
                           file = file!(),
                           line = line!(),
                           msg = &formatted);
        $ctx.emit_event($crate::events::EventType::Warning(full));
    }};
}

/// Logs an error message to the context's event channel.
#[macro_export]
macro_rules! error {
    ($ctx:expr, $msg:expr) => {
        $crate::error!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        $ctx.emit_event($crate::events::EventType::Error(formatted));
    }};
}

/// Extension trait for logging errors instead of propagating them.
pub trait LogExt<T>: Sized {
    /// Emits a warning if the receiver contains an error, returning the
    /// result unchanged so the caller can still `.ok()` it away.
    #[track_caller]
    fn log_err(self, context: &Context) -> Self;
}

impl<T> LogExt<T> for anyhow::Result<T> {
    #[track_caller]
    fn log_err(self, context: &Context) -> Self {
        if let Err(err) = &self {
            let location = std::panic::Location::caller();

            // We are using Anyhow's .context() and to show the inner error, too, we need the "{:#}":
            let full = format!(
                "{file}:{line}: {e:#}",
                file = location.file(),
                line = location.line(),
                e = err,
            );
            context.emit_event(crate::events::EventType::Error(full));
        }
        self
    }
}
