//! List builtins over proper lists of `Pair`s, grounded on
//! `examples/original_source/runtime/builtins.cpp`. `cons`/`car`/`cdr`/
//! `null?` also get inline opcodes (`Opcode::Cons`/`Car`/`Cdr`/`IsNull`)
//! for the hot path; these natives exist so the functions are callable
//! as values too (passed to `map`, stored in a variable, and so on).

use std::rc::Rc;

use crate::kernel::inject::argument;
use crate::vm::context::Context;
use crate::vm::heap::Tag;
use crate::vm::trace::Trace;
use crate::vm::Pointer;

fn require_pair(ctx: &Context, ptr: Pointer, who: &str) -> Result<(), Trace> {
    if ctx.heap().tag(ptr) != Tag::Pair {
        return Err(Trace::type_error("Pair", who));
    }
    Ok(())
}

fn cons(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let car = ctx.arg(base, 0);
    let cdr = ctx.arg(base, 1);
    Ok(ctx.heap_mut().alloc_pair(car, cdr))
}

fn car(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let pair = ctx.arg(base, 0);
    require_pair(ctx, pair, "car expects a pair")?;
    Ok(ctx.heap().car(pair))
}

fn cdr(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let pair = ctx.arg(base, 0);
    require_pair(ctx, pair, "cdr expects a pair")?;
    Ok(ctx.heap().cdr(pair))
}

fn is_null(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let value = ctx.arg(base, 0);
    Ok(ctx.boolean(ctx.heap().tag(value) == Tag::Null))
}

/// Walks `list` while it's a proper list, calling `on_pair` for each
/// cell. Stops and returns an error the first time it finds anything
/// other than a `Pair` or a trailing `Null`.
fn walk_list(ctx: &Context, list: Pointer, mut on_pair: impl FnMut(Pointer)) -> Result<(), Trace> {
    let mut node = list;
    loop {
        match ctx.heap().tag(node) {
            Tag::Null => return Ok(()),
            Tag::Pair => {
                on_pair(ctx.heap().car(node));
                node = ctx.heap().cdr(node);
            }
            _ => return Err(Trace::type_error("Pair or Null", "expected a proper list")),
        }
    }
}

fn is_proper_list(ctx: &Context, list: Pointer) -> bool {
    let mut node = list;
    loop {
        match ctx.heap().tag(node) {
            Tag::Null => return true,
            Tag::Pair => node = ctx.heap().cdr(node),
            _ => return false,
        }
    }
}

fn length(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let list = ctx.arg(base, 0);
    let mut count = 0i32;
    walk_list(ctx, list, |_| count += 1)?;
    Ok(ctx.heap_mut().alloc_integer(count))
}

fn list_p(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let list = ctx.arg(base, 0);
    Ok(ctx.boolean(is_proper_list(ctx, list)))
}

fn reverse(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let list = ctx.arg(base, 0);
    let mut items = Vec::new();
    walk_list(ctx, list, |item| items.push(item))?;
    let mut reversed = ctx.null();
    for item in items {
        reversed = ctx.heap_mut().alloc_pair(item, reversed);
    }
    Ok(reversed)
}

fn nth(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let list = ctx.arg(base, 0);
    let index: i32 = argument(ctx, base, 1)?;
    if index < 0 {
        return Err(Trace::error(crate::vm::trace::Kind::Runtime, "nth expects a non-negative index"));
    }
    let mut node = list;
    for _ in 0..index {
        require_pair(ctx, node, "nth ran off the end of the list")?;
        node = ctx.heap().cdr(node);
    }
    require_pair(ctx, node, "nth ran off the end of the list")?;
    Ok(ctx.heap().car(node))
}

fn map(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let function = ctx.arg(base, 0);
    let list = ctx.arg(base, 1);
    let mut items = Vec::new();
    walk_list(ctx, list, |item| items.push(item))?;

    // Each `call_value` re-enters the VM and can trigger a collection
    // mid-loop; a prior iteration's result isn't reachable from
    // anywhere else once it's just sitting in this Rust `Vec`, so it
    // has to be pinned until the whole list is built.
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        let result = ctx.call_value(function, &[item])?;
        mapped.push(ctx.pin(result));
    }

    let mut result = ctx.null();
    for item in mapped.into_iter().rev() {
        result = ctx.heap_mut().alloc_pair(item.get(), result);
    }
    Ok(result)
}

fn filter(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let function = ctx.arg(base, 0);
    let list = ctx.arg(base, 1);
    let mut items = Vec::new();
    walk_list(ctx, list, |item| items.push(item))?;

    let mut kept = Vec::new();
    for item in items {
        let verdict = ctx.call_value(function, &[item])?;
        if ctx.is_truthy(verdict) {
            kept.push(item);
        }
    }

    let mut result = ctx.null();
    for item in kept.into_iter().rev() {
        result = ctx.heap_mut().alloc_pair(item, result);
    }
    Ok(result)
}

fn fold(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let function = ctx.arg(base, 0);
    let init = ctx.arg(base, 1);
    let list = ctx.arg(base, 2);
    let mut items = Vec::new();
    walk_list(ctx, list, |item| items.push(item))?;

    // `acc` is replaced every iteration by a fresh `call_value` result
    // that nothing else references; pin it so the next iteration's
    // re-entrant call can't have it collected out from under us.
    let mut acc = ctx.pin(init);
    for item in items {
        let next = ctx.call_value(function, &[acc.get(), item])?;
        acc = ctx.pin(next);
    }
    Ok(acc.get())
}

pub(super) fn register(ctx: &mut Context) {
    ctx.define_native("cons", 2, Rc::new(cons));
    ctx.define_native("car", 1, Rc::new(car));
    ctx.define_native("cdr", 1, Rc::new(cdr));
    ctx.define_native("length", 1, Rc::new(length));
    ctx.define_native("list?", 1, Rc::new(list_p));
    ctx.define_native("null?", 1, Rc::new(is_null));
    ctx.define_native("reverse", 1, Rc::new(reverse));
    ctx.define_native("nth", 2, Rc::new(nth));
    ctx.define_native("map", 2, Rc::new(map));
    ctx.define_native("filter", 2, Rc::new(filter));
    ctx.define_native("fold", 3, Rc::new(fold));
}

#[cfg(test)]
mod tests {
    use wisp_common::Source;

    use super::*;

    fn context() -> Context {
        let mut ctx = Context::new();
        register(&mut ctx);
        crate::kernel::arithmetic::register(&mut ctx);
        ctx
    }

    #[test]
    fn length_counts_a_proper_list() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(length (cons 1 (cons 2 (cons 3 null))))")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 3);
    }

    #[test]
    fn reverse_flips_the_list() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(nth (reverse (cons 1 (cons 2 null))) 0)")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 2);
    }

    #[test]
    fn map_applies_the_function_to_every_element() {
        let mut ctx = context();
        let result =
            ctx.exec(Source::source("(nth (map (lambda (x) (+ x 1)) (cons 1 (cons 2 null))) 1)")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 3);
    }

    #[test]
    fn filter_keeps_only_truthy_results() {
        let mut ctx = context();
        let result =
            ctx.exec(Source::source("(length (filter (lambda (x) x) (cons false (cons true null))))")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 1);
    }

    #[test]
    fn fold_accumulates_left_to_right() {
        let mut ctx = context();
        let result = ctx
            .exec(Source::source("(fold (lambda (acc x) (+ acc x)) 0 (cons 1 (cons 2 (cons 3 null))))"))
            .unwrap();
        assert_eq!(ctx.heap().read_integer(result), 6);
    }

    #[test]
    fn nth_out_of_range_is_an_error() {
        let mut ctx = context();
        assert!(ctx.exec(Source::source("(nth (cons 1 null) 5)")).is_err());
    }
}
