//! spec.md §8's operand-stack balance invariant: after executing a
//! well-formed top-level expression (plus its trailing Discard), the
//! stack is back to whatever depth it started at.

use proptest::prelude::*;

use wisp::Context;
use wisp_common::Source;

fn depth(ctx: &Context) -> usize {
    ctx.operand_stack_len()
}

proptest! {
    #[test]
    fn arithmetic_expressions_leave_the_stack_balanced(a in -1000i32..1000, b in -1000i32..1000, c in -1000i32..1000) {
        let mut ctx = Context::new();
        wisp::kernel::install(&mut ctx);
        let before = depth(&ctx);

        let source = format!("(+ {} (* {} {}))", a, b, c);
        ctx.exec(Source::source(&source)).unwrap();

        prop_assert_eq!(depth(&ctx), before);
    }

    #[test]
    fn nested_lets_leave_the_stack_balanced(x in -100i32..100, y in -100i32..100) {
        let mut ctx = Context::new();
        wisp::kernel::install(&mut ctx);
        let before = depth(&ctx);

        let source = format!("(let ((a {})) (let ((b {})) (+ a b)))", x, y);
        ctx.exec(Source::source(&source)).unwrap();

        prop_assert_eq!(depth(&ctx), before);
    }
}
