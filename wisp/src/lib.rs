//! An embeddable interpreter for a small Lisp-family language: a
//! compiler pipeline (lex, parse, resolve, emit), a stack-based
//! bytecode VM, and a relocating mark-compact garbage collector,
//! wired together by `Context`.

pub mod compiler;
pub mod construct;
pub mod kernel;
pub mod persist;
pub mod vm;

pub use vm::{Context, ExecError, NativeFn, Persistent, Pointer, Trace};
