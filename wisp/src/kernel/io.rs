//! I/O builtins, grounded on `builtins.cpp`'s `print` (there, delegated
//! through a global `fs::write`-style hook; here, written directly
//! since stdio plumbing is out of core scope) and `error`.

use std::rc::Rc;

use crate::kernel::inject::argument;
use crate::vm::context::Context;
use crate::vm::heap::{Heap, Tag};
use crate::vm::trace::Trace;
use crate::vm::Pointer;

/// Renders a value the way `print` and error messages display it:
/// recursively for pairs, quoted for strings and characters.
pub fn external_repr(heap: &Heap, ptr: Pointer) -> String {
    match heap.tag(ptr) {
        Tag::Null => "null".to_string(),
        Tag::Boolean => if heap.read_boolean(ptr) { "#t".to_string() } else { "#f".to_string() },
        Tag::Integer => heap.read_integer(ptr).to_string(),
        Tag::Float => heap.read_float(ptr).to_string(),
        Tag::Complex => {
            let (re, im) = heap.read_complex(ptr);
            format!("{}+{}i", re, im)
        }
        Tag::Character => format!("'{}'", heap.read_character(ptr)),
        Tag::String => format!("\"{}\"", heap.read_string(ptr)),
        Tag::Symbol => heap.read_string(heap.symbol_name(ptr)).to_string(),
        Tag::Pair => {
            let mut parts = Vec::new();
            let mut node = ptr;
            loop {
                match heap.tag(node) {
                    Tag::Pair => {
                        parts.push(external_repr(heap, heap.car(node)));
                        node = heap.cdr(node);
                    }
                    Tag::Null => break,
                    _ => {
                        parts.push(".".to_string());
                        parts.push(external_repr(heap, node));
                        break;
                    }
                }
            }
            format!("({})", parts.join(" "))
        }
        Tag::RawPointer => "<raw-pointer>".to_string(),
        Tag::Function => "<function>".to_string(),
        Tag::Box => format!("(box {})", external_repr(heap, heap.box_get(ptr))),
    }
}

fn print(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let rendered: Vec<String> = (0..argc).map(|i| external_repr(ctx.heap(), ctx.arg(base, i))).collect();
    println!("{}", rendered.join(" "));
    Ok(ctx.null())
}

/// Raises a `Trace` runtime error carrying the caller's message —
/// spec.md §7's "explicit `error` built-in".
fn error(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let message: String = argument(ctx, base, 0)?;
    Err(Trace::error(crate::vm::trace::Kind::Runtime, message))
}

pub(super) fn register(ctx: &mut Context) {
    ctx.define_native_variadic("print", 0, Rc::new(print));
    ctx.define_native("error", 1, Rc::new(error));
}
