//! Lumen: a small dynamically-typed scripting language.
//!
//! This crate is the compiler, bytecode VM, and value/object protocol
//! described by the engine — the pieces a host embeds directly. The
//! tokenizer, parser, and bytecode compiler are included (there is no
//! separate frontend crate), but the REPL loop and file-reading entry
//! points a command-line front end wants live in `lumen-cli`, which
//! depends on this crate.
//!
//! The main entry point is [`Interpreter`]: one instance owns a program's
//! heap, string interner, and code arena for its whole lifetime, including
//! every nested `eval()` call it makes along the way.

mod ast;
mod builtins;
mod bytecode;
mod error;
mod format;
mod heap;
mod intern;
mod io;
mod lexer;
mod parser;
mod resource;
mod scope;
mod types;
mod value;

pub use crate::{
    bytecode::vm::{EvalError, Interpreter},
    error::{CompileError, CompileErrorKind, CompileResult, Fault, FaultKind, RunResult},
    format::UnknownFormatType,
    heap::Heap,
    intern::{Interner, StringId},
    io::{CollectingDiagnostics, CollectingOut, Diagnostics, StdOut, Stdout, StderrDiagnostics},
    types::TypeName,
    value::Value,
};
