//! Host-facing exception type.
//!
//! Internal [`RunError`](crate::error::RunError)s are converted at the engine
//! boundary into an [`Exception`] carrying the host-visible kind, a rendered
//! message, the source location of the throw site, and the call frames the
//! error unwound through.

use std::fmt;

/// Host-visible classification of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// The source could not be parsed or lowered.
    Parse,
    /// An uncaught JS throw (or top-level promise rejection).
    Eval,
    /// The host misused the API (e.g. synchronous evaluation of a program
    /// that suspends, or evaluating against a disposed engine).
    HostMisuse,
    /// The host deadline elapsed before evaluation settled.
    Deadline,
    /// The engine was disposed while operations were pending.
    Shutdown,
}

/// A resolved line/column position in the evaluated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLoc {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl CodeLoc {
    /// Resolves a byte offset in `source` to a line/column pair.
    pub(crate) fn from_offset(source: &str, offset: u32) -> Self {
        let offset = (offset as usize).min(source.len());
        let mut line = 1u32;
        let mut col = 1u32;
        for ch in source[..offset].chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Self { line, column: col }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One entry of the call stack attached to an exception, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, or `<script>` for top-level code.
    pub function: String,
    /// Call-site position.
    pub location: CodeLoc,
}

/// A host-facing engine exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    kind: ExceptionKind,
    /// The JS error name (`TypeError`, ...) when one applies.
    name: Option<String>,
    message: String,
    location: Option<CodeLoc>,
    frames: Vec<StackFrame>,
}

impl Exception {
    pub(crate) fn new(kind: ExceptionKind, name: Option<String>, message: String) -> Self {
        Self { kind, name, message, location: None, frames: Vec::new() }
    }

    pub(crate) fn with_location(mut self, location: Option<CodeLoc>) -> Self {
        self.location = location;
        self
    }

    pub(crate) fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub(crate) fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Parse, Some("SyntaxError".to_owned()), message.into())
    }

    /// A host-side failure; native callables return these and scripts
    /// observe them as throws carrying the message.
    #[must_use]
    pub fn host_misuse(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::HostMisuse, None, message.into())
    }

    pub(crate) fn deadline() -> Self {
        Self::new(ExceptionKind::Deadline, None, "evaluation deadline elapsed".to_owned())
    }

    pub(crate) fn shutdown() -> Self {
        Self::new(ExceptionKind::Shutdown, None, "engine shutdown".to_owned())
    }

    /// The host-visible kind of this exception.
    #[must_use]
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// The JS error name, if the failure came from a JS error object.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The rendered message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The throw-site location, when known.
    #[must_use]
    pub fn location(&self) -> Option<CodeLoc> {
        self.location
    }

    /// Call frames the error unwound through, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(loc) = self.location {
            write!(f, " ({loc})")?;
        }
        for frame in &self.frames {
            write!(f, "\n    at {} ({})", frame.function, frame.location)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}
