//! Marshaling between Rust values and heap `Pointer`s, grounded on
//! `passerine-common::inject::Inject` and its `impl_inject!` macro —
//! adapted to operate against `&Heap`/`&mut Heap` rather than an owned
//! `Data` enum, since a value here is an address into the bump arena,
//! not a Rust enum a native function could match on directly.

use crate::vm::context::Context;
use crate::vm::heap::{Heap, Tag};
use crate::vm::trace::Trace;
use crate::vm::Pointer;

pub trait Inject: Sized {
    fn serialize(self, heap: &mut Heap) -> Pointer;
    fn deserialize(heap: &Heap, ptr: Pointer) -> Result<Self, Trace>;
}

macro_rules! impl_inject {
    ($type:ty, $tag:expr, $tag_name:expr, $read:expr, $write:expr) => {
        impl Inject for $type {
            fn serialize(self, heap: &mut Heap) -> Pointer {
                let value = self;
                let write: fn(&mut Heap, $type) -> Pointer = $write;
                write(heap, value)
            }

            fn deserialize(heap: &Heap, ptr: Pointer) -> Result<Self, Trace> {
                if heap.tag(ptr) != $tag {
                    return Err(Trace::type_error($tag_name, "wrong type for this argument"));
                }
                let read: fn(&Heap, Pointer) -> Self = $read;
                Ok(read(heap, ptr))
            }
        }
    };
}

impl_inject!(i32, Tag::Integer, "Integer", |heap, ptr| heap.read_integer(ptr), |heap, value| heap
    .alloc_integer(value));
impl_inject!(f64, Tag::Float, "Float", |heap, ptr| heap.read_float(ptr), |heap, value| heap
    .alloc_float(value));
impl_inject!(bool, Tag::Boolean, "Boolean", |heap, ptr| heap.read_boolean(ptr), |heap, value| heap
    .alloc_boolean(value));
impl_inject!(char, Tag::Character, "Character", |heap, ptr| heap.read_character(ptr), |
    heap,
    value
| heap.alloc_character(value));

impl Inject for String {
    fn serialize(self, heap: &mut Heap) -> Pointer {
        heap.alloc_string(&self)
    }

    fn deserialize(heap: &Heap, ptr: Pointer) -> Result<Self, Trace> {
        if heap.tag(ptr) != Tag::String {
            return Err(Trace::type_error("String", "wrong type for this argument"));
        }
        Ok(heap.read_string(ptr).to_string())
    }
}

/// Reads and deserializes argument `i` of a native call rooted at
/// `base`, the shape every builtin in `kernel` pulls its typed
/// arguments through.
pub fn argument<T: Inject>(ctx: &Context, base: usize, i: usize) -> Result<T, Trace> {
    T::deserialize(ctx.heap(), ctx.arg(base, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::heap::Heap;

    #[test]
    fn integer_round_trips_through_inject() {
        let mut heap = Heap::new(64);
        let ptr = 7i32.serialize(&mut heap);
        assert_eq!(i32::deserialize(&heap, ptr).unwrap(), 7);
    }

    #[test]
    fn wrong_tag_is_a_type_error() {
        let mut heap = Heap::new(64);
        let ptr = heap.alloc_boolean(true);
        assert!(i32::deserialize(&heap, ptr).is_err());
    }

    #[test]
    fn string_round_trips_through_inject() {
        let mut heap = Heap::new(64);
        let ptr = "hello".to_string().serialize(&mut heap);
        assert_eq!(String::deserialize(&heap, ptr).unwrap(), "hello");
    }
}
