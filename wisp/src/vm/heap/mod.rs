pub mod pointer;

pub use pointer::Pointer;

/// The tag stored in every heap record's header byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Null = 0,
    Pair = 1,
    Boolean = 2,
    Integer = 3,
    Float = 4,
    Complex = 5,
    Character = 6,
    String = 7,
    Symbol = 8,
    RawPointer = 9,
    Function = 10,
    Box = 11,
}

impl Tag {
    fn from_byte(byte: u8) -> Tag {
        match byte & 0x0f {
            0 => Tag::Null,
            1 => Tag::Pair,
            2 => Tag::Boolean,
            3 => Tag::Integer,
            4 => Tag::Float,
            5 => Tag::Complex,
            6 => Tag::Character,
            7 => Tag::String,
            8 => Tag::Symbol,
            9 => Tag::RawPointer,
            10 => Tag::Function,
            11 => Tag::Box,
            other => panic!("corrupt heap: unknown tag byte {}", other),
        }
    }

    /// Payload size in bytes, not counting the header byte. `String`
    /// and `Function` are variable/record-shaped and handled
    /// specially by their allocators.
    fn fixed_payload_len(self) -> Option<usize> {
        match self {
            Tag::Null => Some(0),
            Tag::Pair => Some(8),
            Tag::Boolean => Some(1),
            Tag::Integer => Some(4),
            Tag::Float => Some(8),
            Tag::Complex => Some(16),
            Tag::Character => Some(4),
            Tag::String => Some(8), // pointer (4) + length (4), bytes stored inline after
            Tag::Symbol => Some(4),
            Tag::RawPointer => Some(8),
            Tag::Function => None,
            Tag::Box => Some(4),
        }
    }
}

const MARK_BIT: u8 = 0x80;

/// How an invocable `Function` value is called. `entry` is an
/// absolute offset into the `Context`'s single, ever-growing program
/// buffer — each `exec` call appends its freshly compiled code to
/// that buffer (rebasing its own internal jump targets and entry
/// points as it goes), so a function created by one `exec` call
/// remains callable by a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Native(u32),
    NativeVariadic(u32),
    Bytecode { entry: u32 },
    BytecodeVariadic { entry: u32 },
}

/// A single contiguous, bump-allocated arena. Grows only at `end`;
/// there is no free-list reuse during normal allocation — garbage is
/// reclaimed only by the mark-compact collector sliding survivors
/// down over the gaps it found.
pub struct Heap {
    data: Vec<u8>,
    end: u32,
}

impl Heap {
    pub fn new(capacity: usize) -> Heap {
        Heap { data: vec![0; capacity], end: 0 }
    }

    pub fn len(&self) -> u32 {
        self.end
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let needed = self.end as usize + additional;
        if needed > self.data.len() {
            self.data.resize(needed.next_power_of_two().max(64), 0);
        }
    }

    fn alloc_raw(&mut self, total_len: usize) -> Pointer {
        self.ensure_capacity(total_len);
        let at = Pointer(self.end);
        self.end += total_len as u32;
        at
    }

    fn write_u8(&mut self, at: u32, value: u8) {
        self.data[at as usize] = value;
    }

    fn read_u8(&self, at: u32) -> u8 {
        self.data[at as usize]
    }

    fn write_u32(&mut self, at: u32, value: u32) {
        self.data[at as usize..at as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u32(&self, at: u32) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[at as usize..at as usize + 4]);
        u32::from_le_bytes(bytes)
    }

    fn write_i32(&mut self, at: u32, value: i32) {
        self.write_u32(at, value as u32);
    }

    fn read_i32(&self, at: u32) -> i32 {
        self.read_u32(at) as i32
    }

    fn write_f64(&mut self, at: u32, value: f64) {
        self.data[at as usize..at as usize + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn read_f64(&self, at: u32) -> f64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[at as usize..at as usize + 8]);
        f64::from_le_bytes(bytes)
    }

    fn header_addr(ptr: Pointer) -> u32 {
        ptr.0
    }

    fn payload_addr(ptr: Pointer) -> u32 {
        ptr.0 + 1
    }

    pub fn tag(&self, ptr: Pointer) -> Tag {
        Tag::from_byte(self.read_u8(Heap::header_addr(ptr)))
    }

    pub fn is_marked(&self, ptr: Pointer) -> bool {
        self.read_u8(Heap::header_addr(ptr)) & MARK_BIT != 0
    }

    pub fn set_marked(&mut self, ptr: Pointer, marked: bool) {
        let addr = Heap::header_addr(ptr);
        let byte = self.read_u8(addr);
        self.write_u8(addr, if marked { byte | MARK_BIT } else { byte & !MARK_BIT });
    }

    fn alloc_header(&mut self, tag: Tag, payload_len: usize) -> Pointer {
        let at = self.alloc_raw(1 + payload_len);
        self.write_u8(Heap::header_addr(at), tag as u8);
        at
    }

    pub fn alloc_null(&mut self) -> Pointer {
        self.alloc_header(Tag::Null, 0)
    }

    pub fn alloc_boolean(&mut self, value: bool) -> Pointer {
        let at = self.alloc_header(Tag::Boolean, 1);
        self.write_u8(Heap::payload_addr(at), value as u8);
        at
    }

    pub fn read_boolean(&self, ptr: Pointer) -> bool {
        self.read_u8(Heap::payload_addr(ptr)) != 0
    }

    pub fn alloc_integer(&mut self, value: i32) -> Pointer {
        let at = self.alloc_header(Tag::Integer, 4);
        self.write_i32(Heap::payload_addr(at), value);
        at
    }

    pub fn read_integer(&self, ptr: Pointer) -> i32 {
        self.read_i32(Heap::payload_addr(ptr))
    }

    pub fn alloc_float(&mut self, value: f64) -> Pointer {
        let at = self.alloc_header(Tag::Float, 8);
        self.write_f64(Heap::payload_addr(at), value);
        at
    }

    pub fn read_float(&self, ptr: Pointer) -> f64 {
        self.read_f64(Heap::payload_addr(ptr))
    }

    pub fn alloc_complex(&mut self, re: f64, im: f64) -> Pointer {
        let at = self.alloc_header(Tag::Complex, 16);
        self.write_f64(Heap::payload_addr(at), re);
        self.write_f64(Heap::payload_addr(at) + 8, im);
        at
    }

    pub fn read_complex(&self, ptr: Pointer) -> (f64, f64) {
        let base = Heap::payload_addr(ptr);
        (self.read_f64(base), self.read_f64(base + 8))
    }

    pub fn alloc_character(&mut self, value: char) -> Pointer {
        let at = self.alloc_header(Tag::Character, 4);
        self.write_u32(Heap::payload_addr(at), value as u32);
        at
    }

    pub fn read_character(&self, ptr: Pointer) -> char {
        char::from_u32(self.read_u32(Heap::payload_addr(ptr))).unwrap_or('\u{fffd}')
    }

    pub fn alloc_string(&mut self, text: &str) -> Pointer {
        let bytes = text.as_bytes();
        let at = self.alloc_header(Tag::String, 8 + bytes.len());
        let payload = Heap::payload_addr(at);
        self.write_u32(payload, payload + 8);
        self.write_u32(payload + 4, bytes.len() as u32);
        let start = (payload + 8) as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        at
    }

    pub fn read_string(&self, ptr: Pointer) -> &str {
        let payload = Heap::payload_addr(ptr);
        let start = self.read_u32(payload) as usize;
        let len = self.read_u32(payload + 4) as usize;
        std::str::from_utf8(&self.data[start..start + len]).unwrap_or("")
    }

    pub fn alloc_symbol(&mut self, name: Pointer) -> Pointer {
        let at = self.alloc_header(Tag::Symbol, 4);
        self.write_u32(Heap::payload_addr(at), name.0);
        at
    }

    pub fn symbol_name(&self, ptr: Pointer) -> Pointer {
        Pointer(self.read_u32(Heap::payload_addr(ptr)))
    }

    pub fn alloc_pair(&mut self, car: Pointer, cdr: Pointer) -> Pointer {
        let at = self.alloc_header(Tag::Pair, 8);
        let payload = Heap::payload_addr(at);
        self.write_u32(payload, car.0);
        self.write_u32(payload + 4, cdr.0);
        at
    }

    pub fn car(&self, ptr: Pointer) -> Pointer {
        Pointer(self.read_u32(Heap::payload_addr(ptr)))
    }

    pub fn cdr(&self, ptr: Pointer) -> Pointer {
        Pointer(self.read_u32(Heap::payload_addr(ptr) + 4))
    }

    pub fn set_car(&mut self, ptr: Pointer, value: Pointer) {
        self.write_u32(Heap::payload_addr(ptr), value.0);
    }

    pub fn set_cdr(&mut self, ptr: Pointer, value: Pointer) {
        self.write_u32(Heap::payload_addr(ptr) + 4, value.0);
    }

    pub fn alloc_box(&mut self, inner: Pointer) -> Pointer {
        let at = self.alloc_header(Tag::Box, 4);
        self.write_u32(Heap::payload_addr(at), inner.0);
        at
    }

    pub fn box_get(&self, ptr: Pointer) -> Pointer {
        Pointer(self.read_u32(Heap::payload_addr(ptr)))
    }

    pub fn box_set(&mut self, ptr: Pointer, value: Pointer) {
        self.write_u32(Heap::payload_addr(ptr), value.0);
    }

    pub fn alloc_raw_pointer(&mut self, handle: u64) -> Pointer {
        let at = self.alloc_header(Tag::RawPointer, 8);
        let payload = Heap::payload_addr(at);
        self.write_u32(payload, handle as u32);
        self.write_u32(payload + 4, (handle >> 32) as u32);
        at
    }

    pub fn read_raw_pointer(&self, ptr: Pointer) -> u64 {
        let payload = Heap::payload_addr(ptr);
        (self.read_u32(payload) as u64) | ((self.read_u32(payload + 4) as u64) << 32)
    }

    /// `required_arity`, the invocation kind, `definition_env` (a raw
    /// `FrameId`, not a heap pointer — see `vm::frame`), and
    /// `docstring` (`Pointer::NULL` if none).
    pub fn alloc_function(
        &mut self,
        required_arity: u16,
        invocation: Invocation,
        definition_env: u32,
        docstring: Pointer,
    ) -> Pointer {
        let at = self.alloc_header(Tag::Function, FUNCTION_PAYLOAD_LEN);
        let payload = Heap::payload_addr(at);
        self.write_u32(payload, required_arity as u32);
        let (kind, entry) = match invocation {
            Invocation::Native(index) => (0u32, index),
            Invocation::Bytecode { entry } => (1, entry),
            Invocation::BytecodeVariadic { entry } => (2, entry),
            Invocation::NativeVariadic(index) => (3, index),
        };
        self.write_u32(payload + 4, kind);
        self.write_u32(payload + 8, entry);
        self.write_u32(payload + 12, definition_env);
        self.write_u32(payload + 16, docstring.0);
        at
    }

    pub fn function_invocation(&self, ptr: Pointer) -> Invocation {
        let payload = Heap::payload_addr(ptr);
        let kind = self.read_u32(payload + 4);
        let entry = self.read_u32(payload + 8);
        match kind {
            0 => Invocation::Native(entry),
            1 => Invocation::Bytecode { entry },
            2 => Invocation::BytecodeVariadic { entry },
            _ => Invocation::NativeVariadic(entry),
        }
    }

    pub fn function_required_arity(&self, ptr: Pointer) -> u16 {
        self.read_u32(Heap::payload_addr(ptr)) as u16
    }

    pub fn function_definition_env(&self, ptr: Pointer) -> u32 {
        self.read_u32(Heap::payload_addr(ptr) + 12)
    }

    pub fn function_docstring(&self, ptr: Pointer) -> Pointer {
        Pointer(self.read_u32(Heap::payload_addr(ptr) + 16))
    }

    /// The total size in bytes (including header) of the record at
    /// `ptr`. Used by the GC's mark-compact pass to walk the heap
    /// address-order without any external index.
    pub fn record_len(&self, ptr: Pointer) -> usize {
        let tag = self.tag(ptr);
        match tag.fixed_payload_len() {
            Some(len) => 1 + len,
            None => {
                debug_assert_eq!(tag, Tag::Function);
                1 + FUNCTION_PAYLOAD_LEN
            }
        }
    }

    /// Slides every marked record down over the gaps left by
    /// unmarked ones, clearing the mark bit as it goes, and returns
    /// the old-address -> new-address table for every survivor. Does
    /// not rewrite any pointer *fields* inside the moved records —
    /// that's `remap_pointers`'s job, run once every survivor has a
    /// final address.
    pub fn compact(&mut self) -> std::collections::HashMap<Pointer, Pointer> {
        let mut remap = std::collections::HashMap::new();
        let mut write_at: u32 = 0;
        let mut read_at: u32 = 0;
        while read_at < self.end {
            let ptr = Pointer(read_at);
            let len = self.record_len(ptr) as u32;
            if self.is_marked(ptr) {
                if write_at != read_at {
                    self.data.copy_within(read_at as usize..(read_at + len) as usize, write_at as usize);
                }
                let byte = self.data[write_at as usize];
                self.data[write_at as usize] = byte & !MARK_BIT;
                remap.insert(ptr, Pointer(write_at));
                write_at += len;
            }
            read_at += len;
        }
        self.end = write_at;
        remap
    }

    /// Second compaction pass: every record that embeds a pointer to
    /// another record (`Pair`, `Box`, `Symbol`, `Function`'s
    /// docstring) has that field rewritten through `remap`. Must run
    /// after `compact` has finished relocating records, since it
    /// walks the heap at the *new* addresses.
    pub fn remap_pointers(&mut self, remap: &std::collections::HashMap<Pointer, Pointer>) {
        let lookup = |p: Pointer| -> Pointer {
            if p.is_null() {
                p
            } else {
                *remap.get(&p).unwrap_or(&p)
            }
        };

        let mut at: u32 = 0;
        while at < self.end {
            let ptr = Pointer(at);
            let len = self.record_len(ptr) as u32;
            match self.tag(ptr) {
                Tag::Pair => {
                    let car = lookup(self.car(ptr));
                    let cdr = lookup(self.cdr(ptr));
                    self.set_car(ptr, car);
                    self.set_cdr(ptr, cdr);
                }
                Tag::Box => {
                    let inner = lookup(self.box_get(ptr));
                    self.box_set(ptr, inner);
                }
                Tag::Symbol => {
                    let name = lookup(self.symbol_name(ptr));
                    self.write_u32(Heap::payload_addr(ptr), name.0);
                }
                Tag::Function => {
                    let doc = lookup(self.function_docstring(ptr));
                    self.write_u32(Heap::payload_addr(ptr) + 16, doc.0);
                }
                _ => {}
            }
            at += len;
        }
    }
}

const FUNCTION_PAYLOAD_LEN: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trips() {
        let mut heap = Heap::new(64);
        let ptr = heap.alloc_integer(42);
        assert_eq!(heap.tag(ptr), Tag::Integer);
        assert_eq!(heap.read_integer(ptr), 42);
    }

    #[test]
    fn pair_round_trips() {
        let mut heap = Heap::new(64);
        let a = heap.alloc_integer(1);
        let b = heap.alloc_integer(2);
        let pair = heap.alloc_pair(a, b);
        assert_eq!(heap.car(pair), a);
        assert_eq!(heap.cdr(pair), b);
    }

    #[test]
    fn string_round_trips() {
        let mut heap = Heap::new(64);
        let s = heap.alloc_string("hello");
        assert_eq!(heap.read_string(s), "hello");
    }

    #[test]
    fn mark_bit_is_independent_of_tag() {
        let mut heap = Heap::new(64);
        let ptr = heap.alloc_integer(7);
        assert!(!heap.is_marked(ptr));
        heap.set_marked(ptr, true);
        assert!(heap.is_marked(ptr));
        assert_eq!(heap.tag(ptr), Tag::Integer);
        assert_eq!(heap.read_integer(ptr), 7);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut heap = Heap::new(1);
        for i in 0..100 {
            let ptr = heap.alloc_integer(i);
            assert_eq!(heap.read_integer(ptr), i);
        }
    }
}
