//! Generator objects: a lowered plan plus a resumable frame.
//!
//! Calling a `function*` does not run its body; it allocates one of these.
//! Each `next()`/`throw()`/`return()` takes the frame out, drives the IR
//! interpreter until the next suspension or completion, and puts the frame
//! back. The `Executing` state guards against reentrant driving.

use crate::{
    heap::{HeapId, HeapRefs},
    irvm::Frame,
    object::PropTable,
};

/// Generator execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenState {
    /// Suspended at the start or at a `yield`; the frame is parked.
    Suspended,
    /// Currently being driven. Reentrant `next`/`throw`/`return` is a
    /// TypeError.
    Executing,
    /// Body returned or a throw escaped. The frame is gone.
    Completed,
}

#[derive(Debug)]
pub(crate) struct JsGenerator {
    pub state: GenState,
    /// The resumable frame; `None` while executing or after completion.
    pub frame: Option<Box<Frame>>,
    pub table: PropTable,
}

impl JsGenerator {
    pub fn new(frame: Frame, table: PropTable) -> Self {
        Self { state: GenState::Suspended, frame: Some(Box::new(frame)), table }
    }
}

impl HeapRefs for JsGenerator {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        if let Some(frame) = self.frame {
            frame.collect_refs(out);
        }
        self.table.collect_refs(out);
    }
}
