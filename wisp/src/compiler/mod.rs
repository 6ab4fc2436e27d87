//! The compiler pipeline: lex, parse (with inline special-form
//! desugaring), resolve, and emit — each stage a free function
//! threading a `Result<_, Syntax>`, composed by `compile`.

pub mod gen;
pub mod lex;
pub mod parse;
pub mod resolve;
pub mod syntax;

use std::rc::Rc;

use wisp_common::Source;

use crate::construct::{Scope, SymbolTable};
pub use gen::Program;
pub use syntax::Syntax;

/// Compiles source text into a `Program`, resolving names against
/// `symbols`/`global_scope` — callers that want successive `exec`
/// calls to see each other's top-level `def`s pass the same
/// `SymbolTable` and `Scope` back in every time.
pub fn compile(
    source: Rc<Source>,
    symbols: &mut SymbolTable,
    global_scope: &mut Scope,
) -> Result<Program, Syntax> {
    let tokens = lex::Lexer::lex(source)?;
    let forms = parse::Parser::parse_program(tokens, symbols)?;
    resolve::resolve(&forms, global_scope)?;
    gen::compile_program(&forms, symbols)
}
