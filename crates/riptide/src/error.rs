//! Internal error model: the `Result`-carried unwind protocol.
//!
//! All interpreter operations return [`RunResult`]. A JS `throw` travels on
//! the `Err` side as a [`RunError::Throw`]; `try`/`catch` is the only place
//! that turns one back into a value. Engine-raised errors (TypeError and
//! friends) stay allocation-free as an [`ExcKind`] plus message until a
//! script observes them, at which point they are materialized into proper JS
//! error objects. Fatal conditions (recursion overflow, deadlines, engine
//! shutdown) are not catchable by script code and unwind straight to the
//! host.

use std::borrow::Cow;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{ast::Span, intern::StringId, value::Value};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// JS-visible error taxonomy raised by the engine itself.
///
/// User code may throw any value; these kinds only classify engine-raised
/// errors so they can be materialized with the right prototype and `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub(crate) enum ExcKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
}

/// The payload of a catchable throw.
#[derive(Debug)]
pub(crate) enum ThrowPayload {
    /// Engine-raised error, not yet materialized as a JS object.
    Simple(ExcKind, Cow<'static, str>),
    /// A value thrown by script code. Owned: whoever consumes the error must
    /// account for the reference.
    Value(Value),
}

/// One frame descriptor captured while an error unwinds through calls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameDesc {
    /// Interned function name (`<script>` for top level).
    pub name: StringId,
    /// Call-site origin.
    pub span: Span,
}

/// Conditions that terminate evaluation and cannot be caught by script code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FatalKind {
    /// Interpreter recursion depth exceeded.
    StackOverflow,
    /// The host deadline elapsed while draining microtasks.
    Deadline,
    /// The engine was disposed while operations were pending.
    Shutdown,
}

/// A runtime error unwinding through the interpreter.
#[derive(Debug)]
pub(crate) enum RunError {
    /// A catchable JS throw.
    Throw {
        payload: ThrowPayload,
        /// Origin of the throw site, attached by the first statement the
        /// error unwinds through.
        origin: Option<Span>,
        /// Call frames the error has unwound through, innermost first.
        frames: Vec<FrameDesc>,
    },
    /// A fatal engine condition; never visible to `try`/`catch`.
    Fatal(FatalKind),
}

impl RunError {
    pub fn throw(value: Value) -> Self {
        Self::Throw { payload: ThrowPayload::Value(value), origin: None, frames: Vec::new() }
    }

    pub fn simple(kind: ExcKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Throw { payload: ThrowPayload::Simple(kind, message.into()), origin: None, frames: Vec::new() }
    }

    pub fn type_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::simple(ExcKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::simple(ExcKind::RangeError, message)
    }

    pub fn reference_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::simple(ExcKind::ReferenceError, message)
    }

    pub fn syntax_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::simple(ExcKind::SyntaxError, message)
    }

    /// True if `try`/`catch` may observe this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Throw { .. })
    }

    /// Attaches a throw-site origin if none was recorded yet.
    #[must_use]
    pub fn with_origin(mut self, span: Span) -> Self {
        if let Self::Throw { origin, .. } = &mut self
            && origin.is_none()
        {
            *origin = Some(span);
        }
        self
    }

    /// Records a call frame as the error unwinds out of a function call.
    pub fn push_frame(&mut self, name: StringId, span: Span) {
        if let Self::Throw { frames, .. } = self {
            frames.push(FrameDesc { name, span });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_first_wins() {
        let err = RunError::type_error("x is not a function")
            .with_origin(Span::new(3, 8))
            .with_origin(Span::new(10, 12));
        match err {
            RunError::Throw { origin, .. } => assert_eq!(origin, Some(Span::new(3, 8))),
            RunError::Fatal(_) => panic!("expected throw"),
        }
    }

    #[test]
    fn fatal_is_not_catchable() {
        assert!(!RunError::Fatal(FatalKind::Deadline).is_catchable());
        assert!(RunError::type_error("nope").is_catchable());
    }
}
