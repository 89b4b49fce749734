//! The debug channel: checkpoint messages queued for asynchronous host
//! reads.
//!
//! Scripts hit checkpoints via the global `__debug()` callable or a
//! `debugger;` statement. Each checkpoint snapshots the control-flow state,
//! a shallow rendering of the visible bindings, and the call stack, and
//! queues it on a bounded, lossy channel the host drains at its leisure.
//! Messages arrive in program order per engine.

use std::collections::VecDeque;

use crate::{
    ast::Span,
    call::Vm,
    env::ScopeKind,
    exception::CodeLoc,
    heap::HeapId,
    resource::DebugLossPolicy,
};

/// Which interpreter produced the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    /// Top-level script statements.
    TopLevel,
    /// Inside a tree-interpreted function call.
    Function,
    /// Inside a generator frame.
    Generator,
    /// Inside an async function frame.
    Async,
}

/// One checkpoint message.
#[derive(Debug, Clone)]
pub struct DebugMessage {
    /// Control-flow state tag.
    pub state: DebugState,
    /// Shallow variable snapshot: name → short rendering, innermost scope
    /// first, shadowed names omitted.
    pub variables: Vec<(String, String)>,
    /// Call-stack descriptors, innermost first.
    pub stack: Vec<String>,
    /// Script name the checkpoint was hit in.
    pub script: String,
    /// Position of the checkpoint site.
    pub location: CodeLoc,
}

/// Bounded, lossy queue of debug messages.
#[derive(Debug)]
pub(crate) struct DebugChannel {
    queue: VecDeque<DebugMessage>,
    capacity: usize,
    policy: DebugLossPolicy,
    /// Messages discarded due to the capacity bound.
    dropped: u64,
}

impl DebugChannel {
    pub fn new(capacity: usize, policy: DebugLossPolicy) -> Self {
        Self { queue: VecDeque::new(), capacity: capacity.max(1), policy, dropped: 0 }
    }

    pub fn push(&mut self, message: DebugMessage) {
        if self.queue.len() >= self.capacity {
            match self.policy {
                DebugLossPolicy::DropOldest => {
                    self.queue.pop_front();
                    self.dropped += 1;
                }
                DebugLossPolicy::DropNewest => {
                    self.dropped += 1;
                    return;
                }
            }
        }
        self.queue.push_back(message);
    }

    pub fn pop(&mut self) -> Option<DebugMessage> {
        self.queue.pop_front()
    }

    pub fn drain(&mut self) -> Vec<DebugMessage> {
        self.queue.drain(..).collect()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Builds and queues a checkpoint message for the current execution state.
///
/// The variable snapshot is shallow: the scope chain is walked outward from
/// `env`, shadowed names are skipped, and each value gets a one-line
/// rendering. The walk stops at the global scope (the globals would drown
/// the snapshot in builtins).
pub(crate) fn emit_checkpoint(vm: &mut Vm<'_>, env: HeapId, span: Span) {
    let mut variables: Vec<(String, String)> = Vec::new();
    let mut seen: Vec<crate::intern::StringId> = Vec::new();
    let mut current = Some(env);
    while let Some(id) = current {
        let record = vm.heap.env(id);
        for (name, binding) in record.bindings() {
            if seen.contains(name) || !binding.initialized {
                continue;
            }
            seen.push(*name);
            let rendered = crate::value::short_render(vm.heap, vm.interns, &binding.value).into_owned();
            variables.push((vm.interns.get(*name).to_owned(), rendered));
        }
        // The global scope's lexical bindings are included; the global
        // object's properties (builtins) would drown the snapshot.
        if matches!(record.kind, ScopeKind::Global) {
            break;
        }
        current = record.parent;
    }

    let mut stack: Vec<String> = Vec::with_capacity(vm.stack.len() + 1);
    for frame in vm.stack.iter().rev() {
        let loc = CodeLoc::from_offset(vm.source, frame.span.start);
        stack.push(format!("{} ({}:{loc})", vm.interns.get(frame.name), vm.script));
    }
    stack.push(format!("<script> ({})", vm.script));

    let message = DebugMessage {
        state: vm.debug_state,
        variables,
        stack,
        script: vm.script.to_owned(),
        location: CodeLoc::from_offset(vm.source, span.start),
    };
    vm.debug.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(tag: u32) -> DebugMessage {
        DebugMessage {
            state: DebugState::TopLevel,
            variables: vec![("i".to_owned(), tag.to_string())],
            stack: Vec::new(),
            script: "test.js".to_owned(),
            location: CodeLoc { line: 1, column: 1 },
        }
    }

    #[test]
    fn drop_oldest_keeps_newest() {
        let mut channel = DebugChannel::new(2, DebugLossPolicy::DropOldest);
        channel.push(message(1));
        channel.push(message(2));
        channel.push(message(3));
        assert_eq!(channel.dropped(), 1);
        assert_eq!(channel.pop().unwrap().variables[0].1, "2");
        assert_eq!(channel.pop().unwrap().variables[0].1, "3");
    }

    #[test]
    fn drop_newest_keeps_oldest() {
        let mut channel = DebugChannel::new(2, DebugLossPolicy::DropNewest);
        channel.push(message(1));
        channel.push(message(2));
        channel.push(message(3));
        assert_eq!(channel.dropped(), 1);
        assert_eq!(channel.pop().unwrap().variables[0].1, "1");
    }
}
