//! The runtime: a value heap under mark-compact, a frame arena under
//! mark-and-sweep, the dispatch loop that interprets a compiled
//! `Program` against them, and the `Context` that ties the three
//! together for an embedder.

pub mod context;
mod exec;
pub mod frame;
mod gc;
pub mod heap;
pub mod roots;
pub mod trace;

pub use context::{Context, ExecError, NativeFn};
pub use heap::{Heap, Invocation, Pointer, Tag};
pub use roots::Persistent;
pub use trace::Trace;
