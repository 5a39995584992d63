//! The fixed-size memory arena shared by a parser or serializer instance
//! across every message it processes (spec.md §3 "Workspace", §4.1).
//!
//! A C++ implementation of this idea places everything — header bytes,
//! field-index records, ring buffers, codec scratch space — in one
//! contiguous `unsigned char` block with two bump pointers growing toward
//! each other. Placement-new-ing a typed array into raw bytes that way has
//! no safe equivalent in Rust without `unsafe` that would defeat the
//! purpose of this crate, so the arena here is split into two pieces that
//! are still allocated once, up front, and never reallocated:
//!
//! - `bytes`: a `Vec<u8>` bump-allocated from the front, holding the header
//!   buffer and the body ring buffer(s).
//! - the field-index table: a typed `Vec<FieldEntry>` (see `headers.rs`)
//!   with a fixed capacity chosen at construction, playing the role of the
//!   spec's back-allocated array.
//!
//! Both are charged against one configured byte budget so that exceeding
//! it is still reported the way the spec requires: as a configuration
//! error at message start, not a silent reallocation.

use std::fmt;

/// Workspace is full; `reserve_front`/`reserve_back` would make the two
/// allocation fronts cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthError;

impl fmt::Display for LengthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("workspace exhausted: reserve_front/reserve_back would cross")
    }
}

impl std::error::Error for LengthError {}

/// A byte range returned by `reserve_front`/`reserve_back`, valid until the
/// next `clear()`.
pub type Addr = std::ops::Range<usize>;

/// The arena. Constructed once per parser/serializer and reused across
/// every message it handles.
pub struct Workspace {
    bytes: Vec<u8>,
    /// Next free offset from the front of `bytes`.
    front: usize,
    /// Remaining byte budget chargeable to back allocations (the field
    /// table), tracked separately from `bytes` since the table is a typed
    /// `Vec` rather than a byte range of `bytes`.
    back_budget: usize,
    back_reserved: usize,
}

impl Workspace {
    /// Construct an arena of exactly `size` bytes. No further growth ever
    /// occurs: exceeding `size` across a message's front+back allocations
    /// is a configuration error, not resized.
    pub fn new(size: usize) -> Workspace {
        Workspace {
            bytes: vec![0u8; size],
            front: 0,
            back_budget: size,
            back_reserved: 0,
        }
    }

    /// Total configured size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes available for further `reserve_front` calls before crossing
    /// into the space charged to back allocations.
    pub fn front_available(&self) -> usize {
        self.size().saturating_sub(self.front).saturating_sub(self.back_reserved)
    }

    /// Bump-allocate `n` bytes from the front of the arena for exclusive
    /// use by the caller until the next `clear()`. Used for the header
    /// buffer and the body ring buffer(s).
    pub fn reserve_front(&mut self, n: usize) -> Result<Addr, LengthError> {
        if n > self.front_available() {
            return Err(LengthError);
        }
        let start = self.front;
        self.front += n;
        Ok(start..start + n)
    }

    /// Charge `n` bytes against the budget as a back allocation, without
    /// handing back a byte range (the actual storage is a typed `Vec`
    /// elsewhere — see `headers::FieldTable`). Returns an error under the
    /// same condition `reserve_front` would: the two allocation fronts
    /// would cross.
    pub fn reserve_back(&mut self, n: usize) -> Result<(), LengthError> {
        if n > self.size().saturating_sub(self.front).saturating_sub(self.back_reserved) {
            return Err(LengthError);
        }
        self.back_budget -= n;
        self.back_reserved += n;
        Ok(())
    }

    /// Mutable view of the whole front-allocated region, for the caller's
    /// two-segment ring buffers and header buffer to slice into.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..]
    }

    /// Immutable view of the whole front-allocated region.
    pub fn data(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Reset both allocation fronts. Existing `Addr` ranges are invalidated;
    /// callers must re-`reserve_front`/`reserve_back` for the next message.
    pub fn clear(&mut self) {
        self.front = 0;
        self.back_reserved = 0;
        self.back_budget = self.bytes.len();
    }
}

#[cfg(test)]
mod test {
    use super::Workspace;

    #[test]
    fn front_and_back_meet_in_the_middle() {
        let mut ws = Workspace::new(100);
        ws.reserve_front(40).unwrap();
        ws.reserve_back(40).unwrap();
        assert!(ws.reserve_front(21).is_err());
        assert!(ws.reserve_front(20).is_ok());
    }

    #[test]
    fn clear_reopens_the_whole_arena() {
        let mut ws = Workspace::new(16);
        ws.reserve_front(16).unwrap();
        assert!(ws.reserve_front(1).is_err());
        ws.clear();
        assert!(ws.reserve_front(16).is_ok());
    }
}
