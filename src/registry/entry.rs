//! Registry entry - count/shape record for one managed allocation
//!
//! The registry is shared across all element types, so each entry carries a
//! type-erased deallocator captured at registration time. The deallocator
//! must match the allocation's shape: single objects go back through
//! `Box<T>`, arrays through a reconstructed boxed slice.

use serde::Serialize;
use std::fmt;

/// Type-erased deallocation function stored per entry.
///
/// Safety contract: must only be called once, with the address and element
/// count the entry was registered with.
pub type FreeFn = unsafe fn(*mut u8, usize);

/// Shape of a managed allocation: single object or array of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub is_array: bool,
    pub array_len: usize,
}

impl Shape {
    /// Shape of a single heap object.
    #[inline]
    pub const fn object() -> Self {
        Self { is_array: false, array_len: 0 }
    }

    /// Shape of a heap array of `len` elements.
    #[inline]
    pub const fn array(len: usize) -> Self {
        Self { is_array: true, array_len: len }
    }

    /// Number of addressable elements (1 for single objects).
    #[inline]
    pub fn elements(&self) -> usize {
        if self.is_array {
            self.array_len
        } else {
            1
        }
    }
}

/// One managed allocation's bookkeeping record.
pub struct Entry {
    pub(crate) addr: *mut u8,
    pub(crate) ref_count: usize,
    pub(crate) shape: Shape,
    pub(crate) type_name: &'static str,
    pub(crate) free: FreeFn,
}

// Safety: addresses are only dereferenced (freed) by the collection sweep,
// which runs one entry at a time outside any shared borrow of the registry.
unsafe impl Send for Entry {}

impl Entry {
    pub(crate) fn new(addr: *mut u8, shape: Shape, type_name: &'static str, free: FreeFn) -> Self {
        debug_assert!(!addr.is_null());
        Self {
            addr,
            ref_count: 1,
            shape,
            type_name,
            free,
        }
    }

    #[inline]
    pub fn address(&self) -> *mut u8 {
        self.addr
    }

    #[inline]
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Release the underlying allocation. Consumes the entry's ownership of
    /// the address; the entry must already be detached from the registry.
    pub(crate) unsafe fn release(self) {
        (self.free)(self.addr, self.shape.array_len);
    }

    pub(crate) fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            address: self.addr as usize,
            ref_count: self.ref_count,
            is_array: self.shape.is_array,
            array_len: self.shape.array_len,
            type_name: self.type_name,
        }
    }
}

// Entries are located and deduplicated by address alone.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Entry {}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("addr", &self.addr)
            .field("ref_count", &self.ref_count)
            .field("shape", &self.shape)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Read-only view of one entry, for diagnostic dumps.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub address: usize,
    pub ref_count: usize,
    pub is_array: bool,
    pub array_len: usize,
    pub type_name: &'static str,
}

impl fmt::Display for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x}] count={} {}<{}>",
            self.address,
            self.ref_count,
            if self.is_array {
                format!("array[{}]", self.array_len)
            } else {
                "object".to_string()
            },
            self.type_name,
        )
    }
}
