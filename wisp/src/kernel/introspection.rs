//! Introspection builtins, grounded on `builtins.cpp`'s `doc`.

use std::rc::Rc;

use crate::vm::context::Context;
use crate::vm::heap::Tag;
use crate::vm::trace::Trace;
use crate::vm::Pointer;

fn doc(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let function = ctx.arg(base, 0);
    if ctx.heap().tag(function) != Tag::Function {
        return Err(Trace::type_error("Function", "doc expects a function"));
    }
    let docstring = ctx.heap().function_docstring(function);
    Ok(if docstring.is_null() { ctx.null() } else { docstring })
}

fn type_of(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let value = ctx.arg(base, 0);
    let name = match ctx.heap().tag(value) {
        Tag::Null => "Null",
        Tag::Pair => "Pair",
        Tag::Boolean => "Boolean",
        Tag::Integer => "Integer",
        Tag::Float => "Float",
        Tag::Complex => "Complex",
        Tag::Character => "Character",
        Tag::String => "String",
        Tag::Symbol => "Symbol",
        Tag::RawPointer => "RawPointer",
        Tag::Function => "Function",
        Tag::Box => "Box",
    };
    Ok(ctx.heap_mut().alloc_string(name))
}

pub(super) fn register(ctx: &mut Context) {
    ctx.define_native("doc", 1, Rc::new(doc));
    ctx.define_native("type-of", 1, Rc::new(type_of));
}

#[cfg(test)]
mod tests {
    use wisp_common::Source;

    use super::*;

    #[test]
    fn type_of_names_the_tag() {
        let mut ctx = Context::new();
        register(&mut ctx);
        let result = ctx.exec(Source::source("(type-of 5)")).unwrap();
        assert_eq!(ctx.heap().read_string(result), "Integer");
    }

    #[test]
    fn doc_returns_null_when_the_function_has_none() {
        let mut ctx = Context::new();
        register(&mut ctx);
        let result = ctx.exec(Source::source("(doc (lambda (x) x))")).unwrap();
        assert_eq!(ctx.heap().tag(result), Tag::Null);
    }
}
