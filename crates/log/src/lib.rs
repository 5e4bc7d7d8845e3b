//! A simple logging library for the needs of Realms.
//!
//! Messages below the process-wide maximum verbosity (see [`set_max_verbosity`]) are discarded
//! before being formatted.

use std::fmt::Arguments;
use std::str::FromStr;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::Relaxed;

mod stderr;

/// The name of the environment variable read by [`init_from_env`].
pub const ENV_VAR: &str = "REALMS_LOG";

/// A verbosity level for a [`Message`].
///
/// # Remarks
///
/// The ordering of the verbosity levels is in *increasing verbosity*, meaning that
/// [`Error`] is the *least verbose*, and [`Trace`] is the *most verbose*.
///
/// This is useful for filtering messages based on their verbosity level.
///
/// [`Error`]: Verbosity::Error
/// [`Trace`]: Verbosity::Trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Verbosity {
    /// The minimum verbosity level possible.
    ///
    /// This is used to indicate that a message notifies the user of a fatal error. This is
    /// not necessarily a panic, but it's a situtation that prevents at least part of the program
    /// from working correctly.
    Error,
    /// Warnings are usually errors from which the program has recovered by itself, but which
    /// may indicate that something is wrong.
    Warning,
    /// Information that is useful most of the time, but does not indicate that something is
    /// wrong.
    Info,
    /// Debugging information, not useful for the end-user.
    Trace,
}

impl Verbosity {
    /// Converts the raw value stored in [`MAX_VERBOSITY`] back into a [`Verbosity`].
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Info,
            _ => Self::Trace,
        }
    }
}

/// The error returned when a string does not name a [`Verbosity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVerbosity(pub String);

impl std::fmt::Display for UnknownVerbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown verbosity level `{}`", self.0)
    }
}

impl std::error::Error for UnknownVerbosity {}

impl FromStr for Verbosity {
    type Err = UnknownVerbosity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "trace" | "debug" => Ok(Self::Trace),
            _ => Err(UnknownVerbosity(s.to_owned())),
        }
    }
}

/// The most verbose level that is currently written out.
static MAX_VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Info as u8);

/// Sets the most verbose level that will be written out.
#[inline]
pub fn set_max_verbosity(verbosity: Verbosity) {
    MAX_VERBOSITY.store(verbosity as u8, Relaxed);
}

/// Returns the most verbose level that is currently written out.
#[inline]
pub fn max_verbosity() -> Verbosity {
    Verbosity::from_u8(MAX_VERBOSITY.load(Relaxed))
}

/// Returns whether messages of the provided verbosity are currently written out.
#[inline]
pub fn enabled(verbosity: Verbosity) -> bool {
    verbosity <= max_verbosity()
}

/// Reads the maximum verbosity from the [`ENV_VAR`] environment variable.
///
/// If the variable is missing, the current maximum verbosity is left untouched. If it is set
/// to something that's not a verbosity level, a warning is logged.
pub fn init_from_env() {
    let Ok(value) = std::env::var(ENV_VAR) else {
        return;
    };

    match value.parse() {
        Ok(verbosity) => set_max_verbosity(verbosity),
        Err(err) => crate::warning!("ignoring {ENV_VAR}: {err}"),
    }
}

/// A message that can be logged.
pub struct Message<'a> {
    /// The name of the file in which the message was logged.
    pub file: &'static str,
    /// The line at which the message was logged.
    pub line: u32,
    /// The column at which the message was logged.
    pub column: u32,
    /// The verbosity level of the message.
    pub verbosity: Verbosity,
    /// The module in which the message was logged.
    pub module: &'static str,
    /// The message itself.
    pub message: Arguments<'a>,
}

impl<'a> Message<'a> {
    /// Logs this message, unless its verbosity is filtered out.
    pub fn log(self) {
        if enabled(self.verbosity) {
            stderr::log(self);
        }
    }
}

/// Creates a [`Message`] instance with the current invoking location.
#[macro_export]
macro_rules! message {
    ($verbosity:expr, $($args:tt)*) => {
        $crate::Message {
            file: ::core::file!(),
            line: ::core::line!(),
            column: ::core::column!(),
            verbosity: $verbosity,
            module: ::core::module_path!(),
            message: ::core::format_args!($($args)*),
        }
    };
}

/// Logs a message with the current invoking location.
///
/// # Remarks
///
/// This macro is basically equivalent to calling [`Message::log`] on the result of
/// [`message!`].
#[macro_export]
macro_rules! log {
    ($verbosity:expr, $($args:tt)*) => {
        $crate::Message::log($crate::message!($verbosity, $($args)*))
    };
}

/// Logs a message with the current invoking location, with a verbosity level of
/// [`Verbosity::Error`].
#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        $crate::log!($crate::Verbosity::Error, $($args)*)
    };
}

/// Logs a message with the current invoking location, with a verbosity level of
/// [`Verbosity::Warning`].
#[macro_export]
macro_rules! warning {
    ($($args:tt)*) => {
        $crate::log!($crate::Verbosity::Warning, $($args)*)
    };
}

/// Logs a message with the current invoking location, with a verbosity level of
/// [`Verbosity::Info`].
#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        $crate::log!($crate::Verbosity::Info, $($args)*)
    };
}

/// Logs a message with the current invoking location, with a verbosity level of
/// [`Verbosity::Trace`].
#[macro_export]
macro_rules! trace {
    ($($args:tt)*) => {
        $crate::log!($crate::Verbosity::Trace, $($args)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbosity_names() {
        assert_eq!("error".parse(), Ok(Verbosity::Error));
        assert_eq!("WARN".parse(), Ok(Verbosity::Warning));
        assert_eq!(" info ".parse(), Ok(Verbosity::Info));
        assert_eq!("debug".parse(), Ok(Verbosity::Trace));
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn verbosity_round_trips_through_raw_value() {
        for v in [
            Verbosity::Error,
            Verbosity::Warning,
            Verbosity::Info,
            Verbosity::Trace,
        ] {
            assert_eq!(Verbosity::from_u8(v as u8), v);
        }
    }
}
