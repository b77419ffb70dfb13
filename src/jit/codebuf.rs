//! Code buffer for generated machine code.
//!
//! Unlike a growable assembly buffer, this one writes in place into a
//! fixed-capacity paged region through a single cursor. The region is sized
//! for the worst-case program up front, so emission never reallocates and
//! never bounds-checks at steady state (debug builds assert).

use super::memory::{MemoryError, PagedMemory};

/// A write cursor over an executable memory region.
pub struct CodeBuffer {
    mem: PagedMemory,
    pos: usize,
}

impl CodeBuffer {
    /// Allocate a buffer of exactly `size` bytes (must be page-aligned).
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        let mem = PagedMemory::new(size)?;
        Ok(Self { mem, pos: 0 })
    }

    /// Current cursor offset from the start of the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor to a fixed offset (used when seeking to a sub-region).
    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.mem.size());
        self.pos = pos;
    }

    pub fn capacity(&self) -> usize {
        self.mem.size()
    }

    /// Emit a single byte.
    pub fn emit_u8(&mut self, byte: u8) {
        debug_assert!(self.pos < self.mem.size());
        self.mem.as_mut_slice()[self.pos] = byte;
        self.pos += 1;
    }

    /// Emit a 32-bit value (little-endian).
    pub fn emit_u32(&mut self, value: u32) {
        self.emit(&value.to_le_bytes());
    }

    /// Emit a 64-bit value (little-endian).
    pub fn emit_u64(&mut self, value: u64) {
        self.emit(&value.to_le_bytes());
    }

    /// Emit a byte sequence at the cursor.
    pub fn emit(&mut self, bytes: &[u8]) {
        debug_assert!(self.pos + bytes.len() <= self.mem.size());
        self.mem.as_mut_slice()[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Write bytes at a fixed offset without moving the cursor (fragment
    /// preload, eMask patching).
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() <= self.mem.size());
        self.mem.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// The whole buffer contents (for inspection and tests).
    pub fn code(&self) -> &[u8] {
        self.mem.as_slice()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem.as_ptr()
    }

    pub fn make_writable(&mut self) -> Result<(), MemoryError> {
        self.mem.make_writable()
    }

    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        self.mem.make_executable()
    }

    pub fn make_writable_and_executable(&mut self) -> Result<(), MemoryError> {
        self.mem.make_writable_and_executable()
    }
}
