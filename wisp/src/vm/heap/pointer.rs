use std::fmt;

/// A byte offset into a `Heap`'s arena. Plain offsets (rather than
/// native pointers) are what make compaction cheap: sliding a value
/// is "subtract the size of every gap before it" arithmetic on a
/// `u32`, never pointer surgery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pointer(pub u32);

impl Pointer {
    pub const NULL: Pointer = Pointer(u32::MAX);

    pub fn offset(self, bytes: u32) -> Pointer {
        Pointer(self.0 + bytes)
    }

    pub fn is_null(self) -> bool {
        self == Pointer::NULL
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
