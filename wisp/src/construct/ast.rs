use std::cell::Cell;

use wisp_common::{Lit, Spanned};

use crate::construct::symbol::SharedSymbol;

/// A resolved variable location: `frame_dist` frames up from the
/// frame currently executing, at `offset` within that frame's local
/// list. Cached onto the `Ast::Symbol` node the first (and only) time
/// the resolver visits it.
pub type Slot = (u16, u16);

/// The language's abstract syntax tree. Produced directly by the
/// parser — special forms (`if`, `let`, `lambda`, ...) are recognized
/// and desugared (`defn`, `cond`, `delay`, `stream-cons`) while
/// parsing, rather than in a separate pass, since the grammar makes
/// the head of a list immediately available.
///
/// `Symbol`'s `slot` starts `None` and is filled in by the resolver;
/// everything else is immutable once parsed.
#[derive(Debug, Clone)]
pub enum Ast {
    Literal(Lit),
    Symbol { name: SharedSymbol, slot: Cell<Option<Slot>> },
    Quote(Box<Spanned<Ast>>),
    If {
        cond: Box<Spanned<Ast>>,
        then: Box<Spanned<Ast>>,
        otherwise: Option<Box<Spanned<Ast>>>,
    },
    Def {
        name: SharedSymbol,
        mutable: bool,
        value: Box<Spanned<Ast>>,
    },
    Set {
        name: SharedSymbol,
        slot: Cell<Option<Slot>>,
        value: Box<Spanned<Ast>>,
    },
    Lambda {
        params: Vec<SharedSymbol>,
        variadic: Option<SharedSymbol>,
        docstring: Option<String>,
        body: Vec<Spanned<Ast>>,
    },
    Let {
        bindings: Vec<(SharedSymbol, bool, Spanned<Ast>)>,
        body: Vec<Spanned<Ast>>,
    },
    Begin(Vec<Spanned<Ast>>),
    Namespace {
        name: SharedSymbol,
        body: Vec<Spanned<Ast>>,
    },
    And(Vec<Spanned<Ast>>),
    Or(Vec<Spanned<Ast>>),
    Recur(Vec<Spanned<Ast>>),
    Call {
        callee: Box<Spanned<Ast>>,
        args: Vec<Spanned<Ast>>,
    },
    /// An improper list written with `DOT` syntax, e.g. `(a b . c)`.
    /// Only meaningful as quoted data — there's no application
    /// semantics for a callee followed by a dotted tail, so this is
    /// rejected anywhere other than inside `quote`.
    DottedList {
        elements: Vec<Spanned<Ast>>,
        tail: Box<Spanned<Ast>>,
    },
}

impl Ast {
    pub fn symbol(name: SharedSymbol) -> Ast {
        Ast::Symbol { name, slot: Cell::new(None) }
    }
}
