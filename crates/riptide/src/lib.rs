#![doc = include_str!("../../../README.md")]

// first so the arena is in scope for everything that allocates
mod heap;

mod ast;
mod builtins;
mod call;
mod cps;
mod debug;
mod engine;
mod env;
mod error;
mod exception;
mod fold;
mod intern;
mod interp;
mod io;
mod ir;
mod irvm;
mod jsvalue;
mod lower;
mod object;
mod parse;
mod promise;
mod resource;
mod types;
mod value;

pub use crate::{
    debug::{DebugMessage, DebugState},
    engine::{Engine, NativeCall, NativeFn, ScriptAst},
    exception::{CodeLoc, Exception, ExceptionKind, StackFrame},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    ir::IrDiagnostics,
    jsvalue::JsValue,
    resource::{DEFAULT_DEBUG_CAPACITY, DEFAULT_MAX_RECURSION_DEPTH, DebugLossPolicy, EngineConfig},
};
