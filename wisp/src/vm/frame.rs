use crate::vm::heap::Pointer;

/// Identifies an environment frame. Frames live in a side arena
/// rather than on the value heap — a closure's captured frame isn't
/// itself a `Value` the language can observe, just VM-internal
/// bookkeeping the GC still has to keep alive (or collect, in the
/// case of a closure cycle nothing outside still references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// One lexical frame: an ordered list of local bindings plus a link
/// to the frame that encloses it. `def` inside a body grows `locals`
/// in place; `Load`'s `(frame_dist, offset)` walks `parent` links then
/// indexes into `locals`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub parent: Option<FrameId>,
    pub locals: Vec<Pointer>,
}

impl Frame {
    pub fn new(parent: Option<FrameId>) -> Frame {
        Frame { parent, locals: vec![] }
    }

    pub fn push_local(&mut self, value: Pointer) -> u16 {
        self.locals.push(value);
        (self.locals.len() - 1) as u16
    }
}

/// A slab of frames with a free list, so that closing over and
/// dropping frames is O(1) and doesn't require shifting indices the
/// way the value heap's compaction does. Unlike the value heap,
/// frames are garbage-collected by mark-and-sweep, not mark-compact:
/// there's no benefit to packing them tightly, and leaving holes in
/// the slab is cheap.
#[derive(Debug, Default)]
pub struct FrameArena {
    slots: Vec<Option<Frame>>,
    free: Vec<u32>,
}

impl FrameArena {
    pub fn new() -> FrameArena {
        FrameArena::default()
    }

    pub fn alloc(&mut self, parent: Option<FrameId>) -> FrameId {
        let frame = Frame::new(parent);
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(frame);
            FrameId(index)
        } else {
            self.slots.push(Some(frame));
            FrameId((self.slots.len() - 1) as u32)
        }
    }

    pub fn get(&self, id: FrameId) -> &Frame {
        self.slots[id.0 as usize].as_ref().expect("dangling frame id")
    }

    pub fn get_mut(&mut self, id: FrameId) -> &mut Frame {
        self.slots[id.0 as usize].as_mut().expect("dangling frame id")
    }

    pub fn live_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| FrameId(i as u32)))
    }

    /// Frees every frame not present in `live`. Called once per
    /// collection, after the GC has traced every frame reachable from
    /// an actual root; anything left over is an unreachable closure
    /// cycle.
    pub fn sweep(&mut self, live: &std::collections::HashSet<FrameId>) {
        for i in 0..self.slots.len() {
            let id = FrameId(i as u32);
            if self.slots[i].is_some() && !live.contains(&id) {
                self.slots[i] = None;
                self.free.push(i as u32);
            }
        }
    }
}
