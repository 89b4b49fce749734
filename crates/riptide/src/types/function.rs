//! Function values: script closures, engine builtins, host natives, and
//! promise resolvers.

use std::rc::Rc;

use crate::{
    ast::FuncLit,
    builtins::Builtin,
    heap::{HeapId, HeapRefs},
    intern::StringId,
    object::PropTable,
};

/// What runs when the function is called.
#[derive(Debug)]
pub(crate) enum FnKind {
    /// A function parsed from script source; generator/async flavors carry
    /// their lowered plan inside the literal.
    Script(Rc<FuncLit>),
    /// An engine-native builtin (`Array.prototype.map`, `Math.floor`, ...).
    Builtin(Builtin),
    /// A host-registered native callable (index into the engine registry).
    Host(u32),
    /// One half of a promise's resolving pair, handed to executors and
    /// thenables.
    Resolver {
        /// The promise this resolver settles (owned).
        promise: HeapId,
        /// True for the rejecting half.
        reject: bool,
    },
}

/// Constructibility of a function value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CtorKind {
    /// `new` fails with a TypeError (arrows, generators, async functions,
    /// most builtins).
    NotCtor,
    /// An ordinary constructible function or base class.
    Base,
    /// A class with `extends`: `this` stays uninitialized until
    /// `super(...)`.
    Derived,
}

#[derive(Debug)]
pub(crate) struct JsFunction {
    /// Interned function name (empty for anonymous).
    pub name: StringId,
    pub kind: FnKind,
    /// Captured environment (owned); `None` for builtins and host natives.
    pub env: Option<HeapId>,
    /// Home object recorded at method definition, for `super.x` (owned).
    pub home: Option<HeapId>,
    pub ctor: CtorKind,
    /// Own properties, including `prototype` for constructibles.
    pub table: PropTable,
}

impl HeapRefs for JsFunction {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        if let Some(env) = self.env {
            out.push(env);
        }
        if let Some(home) = self.home {
            out.push(home);
        }
        if let FnKind::Resolver { promise, .. } = self.kind {
            out.push(promise);
        }
        self.table.collect_refs(out);
    }
}
