//! Executable memory management using mmap.
//!
//! This module provides a safe abstraction over OS-level memory mapping
//! for the JIT code buffer. The region toggles between writable and
//! executable over its whole length; it is never resized.

use std::ptr::NonNull;

/// Error type for memory operations.
#[derive(Debug)]
pub enum MemoryError {
    AllocationFailed,
    ProtectionFailed,
    InvalidSize,
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::InvalidSize => write!(f, "invalid memory size"),
        }
    }
}

impl std::error::Error for MemoryError {}

/// Current protection of the whole region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadWrite,
    ReadExec,
    ReadWriteExec,
}

/// A page-aligned block of memory for generated code.
///
/// The region starts out writable. `make_executable` flips the whole block
/// to read+execute; `make_writable` flips it back for the next compilation.
/// Hosts that permit it can use `make_writable_and_executable` once and skip
/// per-compilation transitions.
pub struct PagedMemory {
    ptr: NonNull<u8>,
    size: usize,
    protection: Protection,
}

impl PagedMemory {
    /// Map a new region of at least `size` bytes, rounded up to page size.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }

        let page_size = Self::page_size();
        let aligned_size = (size + page_size - 1) & !(page_size - 1);

        let ptr = Self::mmap_alloc(aligned_size)?;

        Ok(Self {
            ptr,
            size: aligned_size,
            protection: Protection::ReadWrite,
        })
    }

    fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    fn mmap_alloc(size: usize) -> Result<NonNull<u8>, MemoryError> {
        use std::ptr;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }

        NonNull::new(ptr as *mut u8).ok_or(MemoryError::AllocationFailed)
    }

    fn mprotect(&mut self, prot: libc::c_int, protection: Protection) -> Result<(), MemoryError> {
        let result =
            unsafe { libc::mprotect(self.ptr.as_ptr() as *mut libc::c_void, self.size, prot) };
        if result != 0 {
            return Err(MemoryError::ProtectionFailed);
        }
        self.protection = protection;
        Ok(())
    }

    /// Make the region writable (and non-executable).
    pub fn make_writable(&mut self) -> Result<(), MemoryError> {
        self.mprotect(libc::PROT_READ | libc::PROT_WRITE, Protection::ReadWrite)
    }

    /// Make the region executable (and read-only).
    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        self.mprotect(libc::PROT_READ | libc::PROT_EXEC, Protection::ReadExec)
    }

    /// Make the region simultaneously writable and executable.
    pub fn make_writable_and_executable(&mut self) -> Result<(), MemoryError> {
        self.mprotect(
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            Protection::ReadWriteExec,
        )
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn is_writable(&self) -> bool {
        matches!(
            self.protection,
            Protection::ReadWrite | Protection::ReadWriteExec
        )
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self.protection,
            Protection::ReadExec | Protection::ReadWriteExec
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Mutable view of the region. The caller must not hold this across a
    /// protection transition.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert!(self.is_writable());
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for PagedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

// PagedMemory owns its mapping exclusively; the raw pointer never aliases
// another Rust object.
unsafe impl Send for PagedMemory {}
