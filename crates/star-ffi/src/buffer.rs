//! Native Buffers
//!
//! This module provides the memory handed across the native boundary:
//! - `NativeBuffer<'a, T>`: a borrowed view into host storage, or bridge-owned
//!   scratch memory with an explicit capacity
//! - `NativeAlloc<T>`: memory the native side allocated itself and whose
//!   ownership has been transferred to the bridge
//!
//! ## Ownership Model
//!
//! - `Borrowed` / `BorrowedMut`: the host owns the memory; the bridge never
//!   frees it and only writes through `BorrowedMut`
//! - `Scratch`: the bridge owns the memory for the duration of one call
//! - `NativeAlloc`: allocated with `calloc` by the native side, released with
//!   `free` when dropped

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use tracing::trace;

use crate::element::NativeElement;
use crate::error::{FfiError, FfiResult};

// ============================================================================
// NativeBuffer
// ============================================================================

/// Typed contiguous memory passed to a native call.
pub enum NativeBuffer<'a, T> {
    /// Read-only view into host storage
    Borrowed(&'a [T]),
    /// Writable view into host storage
    BorrowedMut(&'a mut [T]),
    /// Bridge-owned scratch memory
    Scratch(Vec<T>),
}

impl<'a, T: NativeElement> NativeBuffer<'a, T> {
    /// Allocate zero-filled scratch memory holding exactly `capacity` elements.
    ///
    /// Allocation failure is reported as an error instead of aborting, so the
    /// bridge can signal it like any native failure.
    pub fn scratch(capacity: usize) -> FfiResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| FfiError::allocation_failed(capacity.saturating_mul(T::size())))?;
        data.resize(capacity, T::default());
        trace!(capacity, element = T::NAME, "allocated scratch buffer");
        Ok(NativeBuffer::Scratch(data))
    }

    /// Number of elements the buffer can hold
    pub fn capacity(&self) -> usize {
        match self {
            NativeBuffer::Borrowed(s) => s.len(),
            NativeBuffer::BorrowedMut(s) => s.len(),
            NativeBuffer::Scratch(v) => v.len(),
        }
    }

    /// Check if the buffer is a view into host storage
    pub fn is_borrowed(&self) -> bool {
        !matches!(self, NativeBuffer::Scratch(_))
    }

    /// Check the output-target invariant: capacity must cover the maximum the
    /// call can write.
    pub fn require_capacity(&self, needed: usize) -> FfiResult<()> {
        if needed > self.capacity() {
            return Err(FfiError::buffer_overflow(needed, self.capacity()));
        }
        Ok(())
    }

    /// Get the buffer contents
    pub fn as_slice(&self) -> &[T] {
        match self {
            NativeBuffer::Borrowed(s) => s,
            NativeBuffer::BorrowedMut(s) => s,
            NativeBuffer::Scratch(v) => v,
        }
    }

    /// Get the buffer contents for writing
    pub fn as_mut_slice(&mut self) -> FfiResult<&mut [T]> {
        match self {
            NativeBuffer::Borrowed(_) => Err(FfiError::read_only("borrowed input buffer")),
            NativeBuffer::BorrowedMut(s) => Ok(s),
            NativeBuffer::Scratch(v) => Ok(v.as_mut_slice()),
        }
    }

    /// Copy the first `count` valid elements out of the buffer.
    pub fn valid_prefix(&self, count: usize) -> FfiResult<Vec<T>> {
        self.require_capacity(count)?;
        Ok(self.as_slice()[..count].to_vec())
    }
}

impl<'a, T: NativeElement> fmt::Debug for NativeBuffer<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            NativeBuffer::Borrowed(_) => "Borrowed",
            NativeBuffer::BorrowedMut(_) => "BorrowedMut",
            NativeBuffer::Scratch(_) => "Scratch",
        };
        write!(f, "NativeBuffer::{}<{}>({})", kind, T::NAME, self.capacity())
    }
}

// ============================================================================
// NativeAlloc
// ============================================================================

/// Memory allocated by the native library and transferred to the bridge.
///
/// Dropping a `NativeAlloc` returns the memory with `libc::free`, which is the
/// deallocator the wrapped library documents for memory it hands out.
pub struct NativeAlloc<T: NativeElement> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T: NativeElement> NativeAlloc<T> {
    /// Allocate `len` zero-initialized elements the way the native side does.
    pub fn allocate(len: usize) -> FfiResult<Self> {
        // calloc(0) may legally return NULL; always ask for at least one slot.
        let raw = unsafe { libc::calloc(len.max(1), T::size()) } as *mut T;
        let ptr = NonNull::new(raw)
            .ok_or_else(|| FfiError::allocation_failed(len.saturating_mul(T::size())))?;
        Ok(Self { ptr, len })
    }

    /// Take ownership of a pointer returned by a native call.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `malloc`/`calloc`, hold at least `len` initialized
    /// elements, and not be freed by anyone else.
    pub unsafe fn from_raw(ptr: *mut T, len: usize) -> FfiResult<Self> {
        let ptr = NonNull::new(ptr).ok_or_else(|| FfiError::null_pointer("native allocation"))?;
        Ok(Self { ptr, len })
    }

    /// Number of elements in the allocation
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the allocation holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the raw pointer
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Copy the first `count` elements out of the allocation.
    pub fn valid_prefix(&self, count: usize) -> FfiResult<Vec<T>> {
        if count > self.len {
            return Err(FfiError::buffer_overflow(count, self.len));
        }
        Ok(self[..count].to_vec())
    }
}

impl<T: NativeElement> Deref for NativeAlloc<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: NativeElement> DerefMut for NativeAlloc<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: NativeElement> Drop for NativeAlloc<T> {
    fn drop(&mut self) {
        trace!(len = self.len, element = T::NAME, "releasing native allocation");
        unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) }
    }
}

impl<T: NativeElement> fmt::Debug for NativeAlloc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeAlloc<{}>({:p}, {})", T::NAME, self.ptr, self.len)
    }
}
