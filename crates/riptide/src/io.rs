//! Output routing for `console.log`.
//!
//! Implement [`PrintWriter`] to capture or redirect console output from
//! sandboxed scripts. The default [`StdPrint`] writes to stdout.

use std::io::{self, Write as _};

/// Trait for handling `console.log` output.
pub trait PrintWriter {
    /// Called once for each rendered argument, without separators.
    fn write_str(&mut self, output: &str);

    /// Called for separators (space between arguments) and the trailing
    /// newline.
    fn push(&mut self, ch: char);
}

/// Default writer: straight to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_str(&mut self, output: &str) {
        let _ = io::stdout().write_all(output.as_bytes());
    }

    fn push(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        let _ = io::stdout().write_all(ch.encode_utf8(&mut buf).as_bytes());
        if ch == '\n' {
            let _ = io::stdout().flush();
        }
    }
}

/// A writer that collects all output into a string. Useful for tests and
/// for hosts that surface console output themselves.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// The collected output so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_str(&mut self, output: &str) {
        self.0.push_str(output);
    }

    fn push(&mut self, ch: char) {
        self.0.push(ch);
    }
}

/// A writer that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_str(&mut self, _output: &str) {}

    fn push(&mut self, _ch: char) {}
}
