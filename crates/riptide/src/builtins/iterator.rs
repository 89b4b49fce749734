//! Generator prototype methods and shared iterator plumbing.

use crate::{
    call::Vm,
    error::{RunError, RunResult},
    intern::SymbolId,
    irvm::{self, ResumeKind},
    value::Value,
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install_generator_prototype(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.generator_prototype;
    b.method(proto, "next", Builtin::GenNext);
    b.method(proto, "return", Builtin::GenReturn);
    b.method(proto, "throw", Builtin::GenThrow);
    b.symbol_method(proto, SymbolId::ITERATOR, "[Symbol.iterator]", Builtin::IdentityThis);
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, mut args: Args) -> RunResult<Value> {
    match builtin {
        Builtin::IdentityThis => {
            args.finish(vm);
            Ok(this)
        }
        Builtin::GenNext | Builtin::GenReturn | Builtin::GenThrow => {
            let payload = args.take(0);
            args.finish(vm);
            let Value::Ref(r#gen) = &this else {
                payload.drop_with_heap(vm.heap);
                this.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Method called on an object that is not a generator"));
            };
            let r#gen = *r#gen;
            let kind = match builtin {
                Builtin::GenNext => ResumeKind::Next,
                Builtin::GenReturn => ResumeKind::Return,
                _ => ResumeKind::Throw,
            };
            let result = irvm::generator_resume(vm, r#gen, kind, payload);
            this.drop_with_heap(vm.heap);
            result
        }
        _ => unreachable!("iterator dispatch covers every variant"),
    }
}
