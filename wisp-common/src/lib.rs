//! Shared source, span, literal, and bytecode types used by both
//! `wisp`'s compiler and its virtual machine, so that neither has to
//! re-derive the other's notion of what a literal or a jump target
//! looks like.

pub mod lit;
pub mod opcode;
pub mod source;
pub mod span;

pub use lit::Lit;
pub use opcode::Opcode;
pub use source::Source;
pub use span::{Span, Spanned};
