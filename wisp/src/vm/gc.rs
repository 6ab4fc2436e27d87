//! The collector: mark-compact over the value `Heap`, mark-and-sweep
//! over the `FrameArena`, run as a single pass since the two graphs
//! reference each other (a `Function` value's closure points into the
//! frame arena; a frame's locals point back into the heap).

use std::collections::{HashMap, HashSet};

use crate::vm::frame::{FrameArena, FrameId};
use crate::vm::heap::{Heap, Pointer, Tag};
use crate::vm::roots::PersistentRoots;

/// Everything outside the `Heap`/`FrameArena` pair that can hold a
/// live pointer or frame id. Borrowed mutably for the duration of a
/// collection so the remap pass can rewrite them in place.
pub struct Roots<'a> {
    pub operand_stack: &'a mut Vec<Pointer>,
    pub active_frames: &'a [FrameId],
    pub global_frame: FrameId,
    pub immediates: &'a mut Vec<Pointer>,
    pub persistent: &'a mut PersistentRoots,
    /// The `Null`/`true`/`false` singletons a `Context` caches once at
    /// construction (spec.md §4.6 lists these explicitly as roots) —
    /// not reachable from anywhere else once nothing on the stack or
    /// in a frame happens to hold one. Mutable so compaction can remap
    /// them in place, the same as every other external root.
    pub singletons: &'a mut [Pointer],
}

/// Runs one full collection: trace from every root, sweep dead
/// frames, compact the heap, and remap every surviving pointer (heap
/// internal and external root) to its post-compaction address.
pub fn collect(heap: &mut Heap, frames: &mut FrameArena, roots: Roots) {
    let mut heap_work: Vec<Pointer> = Vec::new();
    let mut frame_work: Vec<FrameId> = Vec::new();
    let mut live_frames: HashSet<FrameId> = HashSet::new();

    heap_work.extend(roots.operand_stack.iter().copied());
    heap_work.extend(roots.immediates.iter().copied());
    heap_work.extend(roots.persistent.iter());
    heap_work.extend(roots.singletons.iter().copied());
    frame_work.extend(roots.active_frames.iter().copied());
    frame_work.push(roots.global_frame);

    // Heap-marking and frame-marking feed each other (a marked
    // Function enqueues its closure frame; a marked frame's locals
    // enqueue more heap pointers). Each inner loop drains its own
    // queue fully, possibly feeding the other; once both are empty
    // there's nothing left to discover.
    while !heap_work.is_empty() || !frame_work.is_empty() {
        while let Some(ptr) = heap_work.pop() {
            if ptr.is_null() || heap.is_marked(ptr) {
                continue;
            }
            heap.set_marked(ptr, true);
            match heap.tag(ptr) {
                Tag::Pair => {
                    heap_work.push(heap.car(ptr));
                    heap_work.push(heap.cdr(ptr));
                }
                Tag::Box => heap_work.push(heap.box_get(ptr)),
                Tag::Symbol => heap_work.push(heap.symbol_name(ptr)),
                Tag::Function => {
                    let docstring = heap.function_docstring(ptr);
                    if !docstring.is_null() {
                        heap_work.push(docstring);
                    }
                    frame_work.push(FrameId(heap.function_definition_env(ptr)));
                }
                Tag::Null | Tag::Boolean | Tag::Integer | Tag::Float | Tag::Complex
                | Tag::Character | Tag::String | Tag::RawPointer => {}
            }
        }

        while let Some(frame_id) = frame_work.pop() {
            if live_frames.contains(&frame_id) {
                continue;
            }
            live_frames.insert(frame_id);
            let frame = frames.get(frame_id);
            heap_work.extend(frame.locals.iter().copied());
            if let Some(parent) = frame.parent {
                frame_work.push(parent);
            }
        }
    }

    frames.sweep(&live_frames);

    let remap = heap.compact();
    heap.remap_pointers(&remap);

    let remap_one = |remap: &HashMap<Pointer, Pointer>, ptr: Pointer| -> Pointer {
        if ptr.is_null() {
            ptr
        } else {
            *remap.get(&ptr).unwrap_or(&ptr)
        }
    };

    for ptr in roots.operand_stack.iter_mut() {
        *ptr = remap_one(&remap, *ptr);
    }
    for ptr in roots.immediates.iter_mut() {
        *ptr = remap_one(&remap, *ptr);
    }
    for ptr in roots.singletons.iter_mut() {
        *ptr = remap_one(&remap, *ptr);
    }
    roots.persistent.remap(|ptr| remap_one(&remap, ptr));

    for id in live_frames {
        let frame = frames.get_mut(id);
        for local in frame.locals.iter_mut() {
            *local = remap_one(&remap, *local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::roots::PersistentRoots;

    #[test]
    fn unreachable_pair_is_reclaimed() {
        let mut heap = Heap::new(64);
        let mut frames = FrameArena::new();
        let global = frames.alloc(None);

        let garbage_car = heap.alloc_integer(1);
        let garbage_cdr = heap.alloc_integer(2);
        let _garbage = heap.alloc_pair(garbage_car, garbage_cdr);
        let kept = heap.alloc_integer(99);
        let before = heap.len();

        let mut operand_stack = vec![kept];
        let mut immediates = vec![];
        let mut persistent = PersistentRoots::new();
        let mut singletons = [];

        collect(
            &mut heap,
            &mut frames,
            Roots {
                operand_stack: &mut operand_stack,
                active_frames: &[],
                global_frame: global,
                immediates: &mut immediates,
                persistent: &mut persistent,
                singletons: &mut singletons,
            },
        );

        assert!(heap.len() < before);
        assert_eq!(heap.read_integer(operand_stack[0]), 99);
    }

    #[test]
    fn reachable_pair_survives_with_contents_intact() {
        let mut heap = Heap::new(64);
        let mut frames = FrameArena::new();
        let global = frames.alloc(None);

        let a = heap.alloc_integer(10);
        let b = heap.alloc_integer(20);
        let pair = heap.alloc_pair(a, b);

        let mut operand_stack = vec![pair];
        let mut immediates = vec![];
        let mut persistent = PersistentRoots::new();
        let mut singletons = [];

        collect(
            &mut heap,
            &mut frames,
            Roots {
                operand_stack: &mut operand_stack,
                active_frames: &[],
                global_frame: global,
                immediates: &mut immediates,
                persistent: &mut persistent,
                singletons: &mut singletons,
            },
        );

        let surviving = operand_stack[0];
        assert_eq!(heap.read_integer(heap.car(surviving)), 10);
        assert_eq!(heap.read_integer(heap.cdr(surviving)), 20);
    }

    #[test]
    fn frame_only_reachable_through_a_cycle_is_collected() {
        let mut heap = Heap::new(64);
        let mut frames = FrameArena::new();
        let global = frames.alloc(None);

        // Two frames that reference each other's functions via the
        // heap (simulating mutually-recursive closures) but are not
        // reachable from any live root.
        let cyclic_a = frames.alloc(Some(global));
        let cyclic_b = frames.alloc(Some(cyclic_a));
        let _ = cyclic_b;

        let mut operand_stack = vec![];
        let mut immediates = vec![];
        let mut persistent = PersistentRoots::new();
        let mut singletons = [];

        collect(
            &mut heap,
            &mut frames,
            Roots {
                operand_stack: &mut operand_stack,
                active_frames: &[],
                global_frame: global,
                immediates: &mut immediates,
                persistent: &mut persistent,
                singletons: &mut singletons,
            },
        );

        assert!(frames.live_ids().collect::<Vec<_>>() == vec![global]);
    }

    #[test]
    fn singletons_survive_with_no_other_root_pointing_at_them() {
        let mut heap = Heap::new(64);
        let mut frames = FrameArena::new();
        let global = frames.alloc(None);

        let null = heap.alloc_null();
        let truthy = heap.alloc_boolean(true);
        let falsy = heap.alloc_boolean(false);

        let mut operand_stack = vec![];
        let mut immediates = vec![];
        let mut persistent = PersistentRoots::new();
        let mut singletons = [null, truthy, falsy];

        collect(
            &mut heap,
            &mut frames,
            Roots {
                operand_stack: &mut operand_stack,
                active_frames: &[],
                global_frame: global,
                immediates: &mut immediates,
                persistent: &mut persistent,
                singletons: &mut singletons,
            },
        );

        assert_eq!(heap.tag(singletons[0]), Tag::Null);
        assert_eq!(heap.tag(singletons[1]), Tag::Boolean);
        assert!(heap.read_boolean(singletons[1]));
        assert_eq!(heap.tag(singletons[2]), Tag::Boolean);
        assert!(!heap.read_boolean(singletons[2]));
    }
}
