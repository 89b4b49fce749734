//! Engine-native builtins, the intrinsic prototypes, and realm setup.
//!
//! Every builtin callable is a variant of [`Builtin`]; function values carry
//! the variant and [`dispatch`] routes a call to its implementation. The
//! realm owns the global object and the intrinsic prototype graph
//! (`Object.prototype` at the root, wrapper prototypes for primitives, and
//! the control-abstraction prototypes for promises and generators).

pub(crate) mod array;
pub(crate) mod console;
pub(crate) mod date;
pub(crate) mod errors;
pub(crate) mod iterator;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod object;
pub(crate) mod promise;
pub(crate) mod regexp_mod;
pub(crate) mod string;

use crate::{
    ast::Span,
    call::Vm,
    env::{ScopeKind, ScopeRecord},
    error::{ExcKind, RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticStrings, StringId, SymbolId},
    object::{PropKey, PropTable, Property},
    types::function::{CtorKind, FnKind, JsFunction},
    value::Value,
};

/// Every engine-native callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    // console / debug
    ConsoleLog,
    DebugHook,
    // global functions
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    NumberIsInteger,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ObjectCtor,
    ArrayCtor,
    SymbolFn,
    // Math
    MathAbs,
    MathFloor,
    MathCeil,
    MathRound,
    MathTrunc,
    MathSign,
    MathSqrt,
    MathPow,
    MathMin,
    MathMax,
    MathRandom,
    MathLog,
    MathExp,
    MathSin,
    MathCos,
    MathTan,
    MathAtan,
    MathAtan2,
    // JSON
    JsonParse,
    JsonStringify,
    // Date
    DateCtor,
    DateNow,
    DateGetTime,
    DateGetFullYear,
    DateGetMonth,
    DateGetDate,
    DateGetDay,
    DateGetHours,
    DateGetMinutes,
    DateGetSeconds,
    DateGetMilliseconds,
    DateToISOString,
    DateToString,
    // Promise
    PromiseCtor,
    PromiseResolve,
    PromiseReject,
    PromiseAll,
    PromiseRace,
    PromiseAllSettled,
    PromiseAny,
    PromiseThen,
    PromiseCatch,
    PromiseFinally,
    // RegExp
    RegExpCtor,
    RegExpTest,
    RegExpExec,
    RegExpToString,
    // Object
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ObjectFreeze,
    ObjectGetPrototypeOf,
    ObjHasOwnProperty,
    ObjToString,
    ObjValueOf,
    // Function.prototype
    FnCall,
    FnApply,
    FnToString,
    // Array
    ArrayIsArray,
    ArrayMap,
    ArrayFilter,
    ArrayReduce,
    ArrayForEach,
    ArrayFind,
    ArrayFindIndex,
    ArraySome,
    ArrayEvery,
    ArrayJoin,
    ArrayIncludes,
    ArrayIndexOf,
    ArraySlice,
    ArraySplice,
    ArrayPush,
    ArrayPop,
    ArrayShift,
    ArrayUnshift,
    ArrayConcat,
    ArrayReverse,
    ArraySort,
    ArrayFlat,
    ArrayValues,
    ArrayIterNext,
    // String.prototype
    StrCharAt,
    StrCharCodeAt,
    StrSlice,
    StrMatch,
    StrReplace,
    StrSearch,
    StrIncludes,
    StrIndexOf,
    StrToUpperCase,
    StrToLowerCase,
    StrTrim,
    StrSplit,
    StrRepeat,
    StrStartsWith,
    StrEndsWith,
    StrPadStart,
    StrPadEnd,
    StrToString,
    StrIterator,
    StrIterNext,
    // Number / Boolean prototypes
    NumToString,
    NumValueOf,
    BoolToString,
    BoolValueOf,
    // Errors
    ErrorCtor(ExcKind),
    ErrorToString,
    // Generator.prototype
    GenNext,
    GenReturn,
    GenThrow,
    IdentityThis,
}

/// The intrinsic objects of a realm.
#[derive(Debug)]
pub(crate) struct Intrinsics {
    pub object_prototype: HeapId,
    pub function_prototype: HeapId,
    pub array_prototype: HeapId,
    pub string_prototype: HeapId,
    pub number_prototype: HeapId,
    pub boolean_prototype: HeapId,
    pub regexp_prototype: HeapId,
    pub date_prototype: HeapId,
    pub promise_prototype: HeapId,
    pub generator_prototype: HeapId,
    pub error_prototype: HeapId,
    pub type_error_prototype: HeapId,
    pub range_error_prototype: HeapId,
    pub reference_error_prototype: HeapId,
    pub syntax_error_prototype: HeapId,
}

impl Intrinsics {
    pub fn error_prototype_for(&self, kind: ExcKind) -> HeapId {
        match kind {
            ExcKind::Error => self.error_prototype,
            ExcKind::TypeError => self.type_error_prototype,
            ExcKind::RangeError => self.range_error_prototype,
            ExcKind::ReferenceError => self.reference_error_prototype,
            ExcKind::SyntaxError => self.syntax_error_prototype,
        }
    }
}

/// The engine's realm: global environment, global object, intrinsics.
#[derive(Debug)]
pub(crate) struct Realm {
    pub global_env: HeapId,
    pub global_object: HeapId,
    pub intrinsics: Intrinsics,
}

/// Owned call arguments with positional access; leftovers must be released
/// via [`Args::finish`]. Small argument lists stay inline.
pub(crate) struct Args {
    values: smallvec::SmallVec<[Value; 4]>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values: smallvec::SmallVec::from_vec(values) }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Takes argument `i`, leaving undefined in its place.
    pub fn take(&mut self, i: usize) -> Value {
        match self.values.get_mut(i) {
            Some(slot) => std::mem::replace(slot, Value::Undefined),
            None => Value::Undefined,
        }
    }

    /// Borrows argument `i` without taking it.
    pub fn peek(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    /// Takes every remaining argument.
    pub fn take_all(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.values).into_vec()
    }

    /// Releases whatever was not taken.
    pub fn finish(self, vm: &mut Vm<'_>) {
        for value in self.values {
            value.drop_with_heap(vm.heap);
        }
    }
}

/// Routes a builtin call. `this` and `args` are owned.
pub(crate) fn dispatch(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    this: Value,
    args: Vec<Value>,
    span: Span,
) -> RunResult<Value> {
    let args = Args::new(args);
    match builtin {
        Builtin::ConsoleLog => console::console_log(vm, this, args),
        Builtin::DebugHook => console::debug_hook(vm, this, args, span),
        Builtin::ParseInt => object::parse_int(vm, this, args),
        Builtin::ParseFloat => object::parse_float(vm, this, args),
        Builtin::IsNaN => object::is_nan(vm, this, args),
        Builtin::IsFinite => object::is_finite(vm, this, args),
        Builtin::NumberIsInteger => object::number_is_integer(vm, this, args),
        Builtin::StringCtor => object::string_conversion(vm, this, args),
        Builtin::NumberCtor => object::number_conversion(vm, this, args),
        Builtin::BooleanCtor => object::boolean_conversion(vm, this, args),
        Builtin::ObjectCtor => object::object_callable(vm, this, args),
        Builtin::ArrayCtor => array::array_callable(vm, this, args),
        Builtin::SymbolFn => object::symbol_callable(vm, this, args),
        Builtin::MathAbs
        | Builtin::MathFloor
        | Builtin::MathCeil
        | Builtin::MathRound
        | Builtin::MathTrunc
        | Builtin::MathSign
        | Builtin::MathSqrt
        | Builtin::MathPow
        | Builtin::MathMin
        | Builtin::MathMax
        | Builtin::MathRandom
        | Builtin::MathLog
        | Builtin::MathExp
        | Builtin::MathSin
        | Builtin::MathCos
        | Builtin::MathTan
        | Builtin::MathAtan
        | Builtin::MathAtan2 => math::dispatch(vm, builtin, this, args),
        Builtin::JsonParse => json::json_parse(vm, this, args),
        Builtin::JsonStringify => json::json_stringify(vm, this, args),
        Builtin::DateCtor => date::date_callable(vm, this, args),
        Builtin::DateNow => date::date_now(vm, this, args),
        Builtin::DateGetTime
        | Builtin::DateGetFullYear
        | Builtin::DateGetMonth
        | Builtin::DateGetDate
        | Builtin::DateGetDay
        | Builtin::DateGetHours
        | Builtin::DateGetMinutes
        | Builtin::DateGetSeconds
        | Builtin::DateGetMilliseconds
        | Builtin::DateToISOString
        | Builtin::DateToString => date::dispatch(vm, builtin, this, args),
        Builtin::PromiseCtor => {
            args.finish(vm);
            this.drop_with_heap(vm.heap);
            Err(RunError::type_error("Promise constructor requires 'new'"))
        }
        Builtin::PromiseResolve
        | Builtin::PromiseReject
        | Builtin::PromiseAll
        | Builtin::PromiseRace
        | Builtin::PromiseAllSettled
        | Builtin::PromiseAny
        | Builtin::PromiseThen
        | Builtin::PromiseCatch
        | Builtin::PromiseFinally => promise::dispatch(vm, builtin, this, args, span),
        Builtin::RegExpCtor => regexp_mod::regexp_callable(vm, this, args),
        Builtin::RegExpTest | Builtin::RegExpExec | Builtin::RegExpToString => {
            regexp_mod::dispatch(vm, builtin, this, args)
        }
        Builtin::ObjectKeys
        | Builtin::ObjectValues
        | Builtin::ObjectEntries
        | Builtin::ObjectAssign
        | Builtin::ObjectFreeze
        | Builtin::ObjectGetPrototypeOf
        | Builtin::ObjHasOwnProperty
        | Builtin::ObjToString
        | Builtin::ObjValueOf => object::dispatch(vm, builtin, this, args),
        Builtin::FnCall | Builtin::FnApply | Builtin::FnToString => object::fn_dispatch(vm, builtin, this, args, span),
        Builtin::ArrayIsArray
        | Builtin::ArrayMap
        | Builtin::ArrayFilter
        | Builtin::ArrayReduce
        | Builtin::ArrayForEach
        | Builtin::ArrayFind
        | Builtin::ArrayFindIndex
        | Builtin::ArraySome
        | Builtin::ArrayEvery
        | Builtin::ArrayJoin
        | Builtin::ArrayIncludes
        | Builtin::ArrayIndexOf
        | Builtin::ArraySlice
        | Builtin::ArraySplice
        | Builtin::ArrayPush
        | Builtin::ArrayPop
        | Builtin::ArrayShift
        | Builtin::ArrayUnshift
        | Builtin::ArrayConcat
        | Builtin::ArrayReverse
        | Builtin::ArraySort
        | Builtin::ArrayFlat
        | Builtin::ArrayValues
        | Builtin::ArrayIterNext => array::dispatch(vm, builtin, this, args, span),
        Builtin::StrCharAt
        | Builtin::StrCharCodeAt
        | Builtin::StrSlice
        | Builtin::StrMatch
        | Builtin::StrReplace
        | Builtin::StrSearch
        | Builtin::StrIncludes
        | Builtin::StrIndexOf
        | Builtin::StrToUpperCase
        | Builtin::StrToLowerCase
        | Builtin::StrTrim
        | Builtin::StrSplit
        | Builtin::StrRepeat
        | Builtin::StrStartsWith
        | Builtin::StrEndsWith
        | Builtin::StrPadStart
        | Builtin::StrPadEnd
        | Builtin::StrToString
        | Builtin::StrIterator
        | Builtin::StrIterNext => string::dispatch(vm, builtin, this, args),
        Builtin::NumToString | Builtin::NumValueOf | Builtin::BoolToString | Builtin::BoolValueOf => {
            object::primitive_dispatch(vm, builtin, this, args)
        }
        Builtin::ErrorCtor(kind) => errors::error_callable(vm, kind, this, args),
        Builtin::ErrorToString => errors::error_to_string(vm, this, args),
        Builtin::GenNext | Builtin::GenReturn | Builtin::GenThrow | Builtin::IdentityThis => {
            iterator::dispatch(vm, builtin, this, args)
        }
    }
}

/// `new` on a builtin callable.
pub(crate) fn construct_builtin(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    args: Vec<Value>,
    span: Span,
) -> RunResult<Value> {
    let args = Args::new(args);
    match builtin {
        Builtin::PromiseCtor => promise::promise_construct(vm, args, span),
        Builtin::DateCtor => date::date_construct(vm, args),
        Builtin::RegExpCtor => regexp_mod::regexp_construct(vm, args),
        Builtin::ErrorCtor(kind) => errors::error_construct(vm, kind, args),
        Builtin::ObjectCtor => object::object_construct(vm, args),
        Builtin::ArrayCtor => array::array_construct(vm, args),
        Builtin::SymbolFn => {
            args.finish(vm);
            Err(RunError::type_error("Symbol is not a constructor"))
        }
        _ => {
            args.finish(vm);
            Err(RunError::type_error("not a constructor").with_origin(span))
        }
    }
}

// ---------------------------------------------------------------------------
// Realm construction

/// Builds the realm: intrinsic prototype graph, global object, global scope.
pub(crate) fn create_realm(heap: &mut Heap, interns: &mut Interns) -> Realm {
    // Prototype graph roots. Object.prototype has no prototype.
    let object_prototype = heap.alloc(HeapData::Object(PropTable::new(None)));
    let function_prototype = alloc_object(heap, object_prototype);
    let array_prototype = alloc_object(heap, object_prototype);
    let string_prototype = alloc_object(heap, object_prototype);
    let number_prototype = alloc_object(heap, object_prototype);
    let boolean_prototype = alloc_object(heap, object_prototype);
    let regexp_prototype = alloc_object(heap, object_prototype);
    let date_prototype = alloc_object(heap, object_prototype);
    let promise_prototype = alloc_object(heap, object_prototype);
    let generator_prototype = alloc_object(heap, object_prototype);
    let error_prototype = alloc_object(heap, object_prototype);
    let type_error_prototype = alloc_object(heap, error_prototype);
    let range_error_prototype = alloc_object(heap, error_prototype);
    let reference_error_prototype = alloc_object(heap, error_prototype);
    let syntax_error_prototype = alloc_object(heap, error_prototype);

    let intrinsics = Intrinsics {
        object_prototype,
        function_prototype,
        array_prototype,
        string_prototype,
        number_prototype,
        boolean_prototype,
        regexp_prototype,
        date_prototype,
        promise_prototype,
        generator_prototype,
        error_prototype,
        type_error_prototype,
        range_error_prototype,
        reference_error_prototype,
        syntax_error_prototype,
    };

    let mut b = RealmBuilder { heap: &mut *heap, interns: &mut *interns, intrinsics: &intrinsics };

    // Prototype methods.
    object::install_object_prototype(&mut b);
    object::install_function_prototype(&mut b);
    array::install(&mut b);
    string::install(&mut b);
    b.method(number_prototype, "toString", Builtin::NumToString);
    b.method(number_prototype, "valueOf", Builtin::NumValueOf);
    b.method(boolean_prototype, "toString", Builtin::BoolToString);
    b.method(boolean_prototype, "valueOf", Builtin::BoolValueOf);
    regexp_mod::install(&mut b);
    date::install(&mut b);
    promise::install_prototype(&mut b);
    iterator::install_generator_prototype(&mut b);
    errors::install(&mut b);

    // The global object and its bindings.
    heap.inc_ref(object_prototype);
    let global_object = heap.alloc(HeapData::Object(PropTable::new(Some(object_prototype))));
    let mut b = RealmBuilder { heap: &mut *heap, interns: &mut *interns, intrinsics: &intrinsics };
    b.data(global_object, "NaN", Value::Number(f64::NAN));
    b.data(global_object, "Infinity", Value::Number(f64::INFINITY));
    b.global_fn(global_object, "parseInt", Builtin::ParseInt);
    b.global_fn(global_object, "parseFloat", Builtin::ParseFloat);
    b.global_fn(global_object, "isNaN", Builtin::IsNaN);
    b.global_fn(global_object, "isFinite", Builtin::IsFinite);
    b.global_fn(global_object, "__debug", Builtin::DebugHook);
    console::install(&mut b, global_object);
    math::install(&mut b, global_object);
    json::install(&mut b, global_object);
    object::install_globals(&mut b, global_object);
    array::install_globals(&mut b, global_object);
    string::install_globals(&mut b, global_object);
    date::install_globals(&mut b, global_object);
    promise::install_globals(&mut b, global_object);
    regexp_mod::install_globals(&mut b, global_object);
    errors::install_globals(&mut b, global_object);
    object::install_symbol(&mut b, global_object);

    // The global scope record, backed by the global object.
    let global_env = heap.alloc(HeapData::Env(ScopeRecord::new_global()));

    Realm { global_env, global_object, intrinsics }
}

fn alloc_object(heap: &mut Heap, proto: HeapId) -> HeapId {
    heap.inc_ref(proto);
    heap.alloc(HeapData::Object(PropTable::new(Some(proto))))
}

/// Setup-time helper bundle: builds function values and defines properties
/// without a full `Vm`.
pub(crate) struct RealmBuilder<'a> {
    pub heap: &'a mut Heap,
    pub interns: &'a mut Interns,
    pub intrinsics: &'a Intrinsics,
}

impl RealmBuilder<'_> {
    /// Creates a builtin function value.
    pub fn function(&mut self, name: &str, builtin: Builtin) -> Value {
        let name_id = self.interns.intern(name);
        self.function_named(name_id, builtin)
    }

    pub fn function_named(&mut self, name: StringId, builtin: Builtin) -> Value {
        let fn_proto = self.intrinsics.function_prototype;
        self.heap.inc_ref(fn_proto);
        let mut table = PropTable::new(Some(fn_proto));
        table.insert(PropKey::Atom(StaticStrings::Name.id()), Property::builtin(Value::Str(name)));
        let fid = self.heap.alloc(HeapData::Function(JsFunction {
            name,
            kind: FnKind::Builtin(builtin),
            env: None,
            home: None,
            ctor: CtorKind::NotCtor,
            table,
        }));
        Value::Ref(fid)
    }

    /// Defines a non-enumerable method on a prototype object.
    pub fn method(&mut self, target: HeapId, name: &str, builtin: Builtin) {
        let name_id = self.interns.intern(name);
        let f = self.function_named(name_id, builtin);
        crate::object::define(self.heap, target, PropKey::Atom(name_id), Property::builtin(f));
    }

    /// Defines a non-enumerable symbol-keyed method.
    pub fn symbol_method(&mut self, target: HeapId, sym: SymbolId, name: &str, builtin: Builtin) {
        let name_id = self.interns.intern(name);
        let f = self.function_named(name_id, builtin);
        crate::object::define(self.heap, target, PropKey::Sym(sym), Property::builtin(f));
    }

    /// Defines an enumerable-style data property (global bindings are
    /// writable and enumerable, like `var`s).
    pub fn data(&mut self, target: HeapId, name: &str, value: Value) {
        let name_id = self.interns.intern(name);
        crate::object::define(self.heap, target, PropKey::Atom(name_id), Property::data(value));
    }

    /// Defines a non-enumerable data property.
    pub fn builtin_data(&mut self, target: HeapId, name: &str, value: Value) {
        let name_id = self.interns.intern(name);
        crate::object::define(self.heap, target, PropKey::Atom(name_id), Property::builtin(value));
    }

    /// Installs a global builtin function.
    pub fn global_fn(&mut self, global: HeapId, name: &str, builtin: Builtin) {
        let name_id = self.interns.intern(name);
        let f = self.function_named(name_id, builtin);
        crate::object::define(self.heap, global, PropKey::Atom(name_id), Property::builtin(f));
    }

    /// Allocates a plain namespace object (like `Math` or `JSON`).
    pub fn namespace(&mut self) -> HeapId {
        let proto = self.intrinsics.object_prototype;
        self.heap.inc_ref(proto);
        self.heap.alloc(HeapData::Object(PropTable::new(Some(proto))))
    }

    /// Creates a constructor-style function value whose `prototype` property
    /// is `proto` (and defines `proto.constructor` back).
    pub fn constructor(&mut self, name: &str, builtin: Builtin, proto: HeapId) -> Value {
        let name_id = self.interns.intern(name);
        let f = self.function_named(name_id, builtin);
        let Value::Ref(fid) = &f else { unreachable!() };
        self.heap.inc_ref(proto);
        crate::object::define(
            self.heap,
            *fid,
            PropKey::Atom(StaticStrings::Prototype.id()),
            Property::builtin(Value::Ref(proto)),
        );
        self.heap.inc_ref(*fid);
        crate::object::define(
            self.heap,
            proto,
            PropKey::Atom(StaticStrings::Constructor.id()),
            Property::builtin(Value::Ref(*fid)),
        );
        f
    }
}

impl ScopeRecord {
    /// The engine's single global scope record.
    pub(crate) fn new_global() -> Self {
        Self::empty(ScopeKind::Global)
    }
}
