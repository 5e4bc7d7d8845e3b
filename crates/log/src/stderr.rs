use crate::{Message, Verbosity};
use std::io::{self, Write};

/// Logs a message to the standard error stream.
pub fn log(message: Message) {
    let _ = write_message(&mut std::io::stderr().lock(), message);
}

/// Writes one colored line for `message` into `out`.
///
/// Trace messages carry the module they were logged from, the others carry their location.
fn write_message(
    out: &mut impl Write,
    Message {
        file,
        line,
        verbosity,
        module,
        message,
        ..
    }: Message,
) -> io::Result<()> {
    let prefix = match verbosity {
        Verbosity::Error => "\x1B[1;31mERROR\x1B[0m  ",
        Verbosity::Warning => "\x1B[1;33mWARNING\x1B[0m",
        Verbosity::Info => "\x1B[1;34mINFO\x1B[0m   ",
        Verbosity::Trace => "\x1B[1;30mTRACE\x1B[0m  ",
    };

    match verbosity {
        Verbosity::Trace => writeln!(out, "{prefix}{message} \x1B[2;90m[{module}]\x1B[0m"),
        _ => writeln!(out, "{prefix}{message} \x1B[2;90m(at {file}:{line})\x1B[0m"),
    }
}
