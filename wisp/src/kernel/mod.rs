//! The built-in function library spec.md §3/§4 calls "arithmetic,
//! list, I/O, introspection" — registered as native `Function`s on a
//! fresh `Context` by `install`. Split into one module per builtin
//! family, the way `passerine`'s own (unfinished) `kernel/` directory
//! was laid out before its `Effect`/`Inject` derive stubs were dropped
//! for the hand-written `inject` pattern below.

mod arithmetic;
pub mod inject;
mod introspection;
mod io;
mod list;

pub use io::external_repr;

use crate::vm::context::Context;

/// Registers every builtin onto `ctx` as a top-level global, the way a
/// prelude would. `Context::new` alone has no builtins at all — an
/// embedder who wants a bare evaluator is free to skip this.
pub fn install(ctx: &mut Context) {
    arithmetic::register(ctx);
    list::register(ctx);
    io::register(ctx);
    introspection::register(ctx);
}

#[cfg(test)]
mod tests {
    use wisp_common::Source;

    use super::*;

    #[test]
    fn install_wires_up_builtins_from_every_family() {
        let mut ctx = Context::new();
        install(&mut ctx);
        let result = ctx.exec(Source::source("(length (map (lambda (x) (* x x)) (cons 1 (cons 2 null))))")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 2);
    }
}
