//! Reference-counted smart pointer over registry-tracked allocations
//!
//! Design: every lifecycle operation (adopt, clone, assign, drop) is one
//! critical section against the process-wide registry. Dropping a pointer
//! always runs a full collection sweep, so reclamation is deterministic.
//!
//! A `Managed<T>` must only adopt memory obtained from a single dynamic
//! allocation that the caller will never independently deallocate. Adopting
//! a stack address, or an address already freed, corrupts the bookkeeping
//! and panics at the next registry lookup.


use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::registry::{self, Shape};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use once_cell::sync::OnceCell;

/// Set once the process-exit flush hook has been installed.
static EXIT_FLUSH: OnceCell<()> = OnceCell::new();

/// Register the registry flush to run once at process exit. Called on the
/// first pointer construction; later constructions are no-ops.
fn install_exit_flush() {
    EXIT_FLUSH.get_or_init(|| {
        #[cfg(unix)]
        unsafe {
            let _ = libc::atexit(exit_flush);
        }
    });
}

#[cfg(unix)]
extern "C" fn exit_flush() {
    registry::shutdown();
}

unsafe fn free_object<T>(addr: *mut u8, _len: usize) {
    drop(Box::from_raw(addr as *mut T));
}

unsafe fn free_array<T>(addr: *mut u8, len: usize) {
    let slice = core::ptr::slice_from_raw_parts_mut(addr as *mut T, len);
    drop(Box::from_raw(slice));
}

/// Reference-counted pointer to a registry-tracked heap allocation.
///
/// States: unmanaged (null address, the `Default`) or managed. The
/// underlying allocation lives as long as any `Managed` referencing it;
/// release happens when the shared count reaches zero and a sweep runs.
pub struct Managed<T> {
    addr: *mut T,
    shape: Shape,
    _marker: PhantomData<T>,
}

impl<T> Managed<T> {
    /// A null, unmanaged pointer.
    #[inline]
    pub fn null() -> Self {
        Self {
            addr: core::ptr::null_mut(),
            shape: Shape::object(),
            _marker: PhantomData,
        }
    }

    /// Adopt a raw single-object allocation.
    ///
    /// A null `ptr` produces an unmanaged pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::<T>::into_raw` (a single live
    /// heap object), and ownership transfers here: the caller must never
    /// free it independently.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self::register(ptr, Shape::object())
    }

    /// Adopt a raw array allocation of `len` elements.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::<[T]>::into_raw` of a slice of
    /// exactly `len` elements, with ownership transferring here.
    pub unsafe fn from_raw_array(ptr: *mut T, len: usize) -> Self {
        Self::register(ptr, Shape::array(len))
    }

    /// Adopt a boxed object, the safe form of the handoff contract.
    pub fn adopt(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }

    /// Adopt a boxed slice, the safe form of the array handoff contract.
    pub fn adopt_array(values: Box<[T]>) -> Self {
        let len = values.len();
        unsafe { Self::from_raw_array(Box::into_raw(values).cast::<T>(), len) }
    }

    unsafe fn register(ptr: *mut T, shape: Shape) -> Self {
        install_exit_flush();

        // Register before constructing Self: a fatal registration panic
        // must not unwind through a half-built pointer's drop, which would
        // release a claim this pointer never held.
        if !ptr.is_null() {
            registry::with_global(|r| {
                r.register_or_increment(
                    ptr.cast(),
                    shape,
                    core::any::type_name::<T>(),
                    Self::free_fn_for(shape),
                )
            });
        }
        Self {
            addr: ptr,
            shape,
            _marker: PhantomData,
        }
    }

    fn free_fn_for(shape: Shape) -> registry::FreeFn {
        if shape.is_array {
            free_array::<T>
        } else {
            free_object::<T>
        }
    }

    /// Assign a raw single-object allocation, releasing this pointer's claim
    /// on its current address first. Returns the adopted address.
    ///
    /// # Safety
    ///
    /// Same contract as [`Managed::from_raw`].
    pub unsafe fn set_raw(&mut self, ptr: *mut T) -> *mut T {
        self.reassign(ptr, Shape::object())
    }

    /// Assign a raw array allocation of `len` elements. Returns the adopted
    /// address.
    ///
    /// # Safety
    ///
    /// Same contract as [`Managed::from_raw_array`].
    pub unsafe fn set_raw_array(&mut self, ptr: *mut T, len: usize) -> *mut T {
        self.reassign(ptr, Shape::array(len))
    }

    unsafe fn reassign(&mut self, ptr: *mut T, shape: Shape) -> *mut T {
        let old = self.addr;

        // Old decrement and new registration form one critical section.
        // Self is only updated after both succeed, so a registration panic
        // never leaves this pointer claiming an address it never counted.
        registry::with_global(|r| {
            if !old.is_null() {
                r.decrement(old.cast());
            }
            if !ptr.is_null() {
                r.register_or_increment(
                    ptr.cast(),
                    shape,
                    core::any::type_name::<T>(),
                    Self::free_fn_for(shape),
                );
            }
        });
        self.addr = ptr;
        self.shape = shape;
        ptr
    }

    /// Whether this pointer is in the unmanaged (null) state.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.shape.is_array
    }

    /// Number of addressable elements: the array length, or 1 for a single
    /// object.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.elements()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw address escape hatch; no effect on reference counts.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.addr
    }

    /// Bounds-checked element access.
    ///
    /// On an array, any index past the declared length is out of range. On a
    /// single object only index 0 is valid.
    pub fn get(&self, index: usize) -> Result<&T> {
        self.check_index(index)?;
        Ok(unsafe { &*self.addr.add(index) })
    }

    /// Bounds-checked mutable element access.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        self.check_index(index)?;
        Ok(unsafe { &mut *self.addr.add(index) })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        assert!(!self.addr.is_null(), "indexed access through an unmanaged pointer");
        let len = self.len();
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        Ok(())
    }

    /// Cursor at the start of the managed allocation. Unmanaged pointers
    /// yield an empty cursor.
    pub fn begin(&self) -> Cursor<T> {
        if self.addr.is_null() {
            return Cursor::default();
        }
        let n = self.shape.elements();
        unsafe { Cursor::new(self.addr, self.addr, self.addr.add(n)) }
    }

    /// Cursor one past the last element of the managed allocation.
    pub fn end(&self) -> Cursor<T> {
        if self.addr.is_null() {
            return Cursor::default();
        }
        let n = self.shape.elements();
        unsafe { Cursor::new(self.addr.add(n), self.addr, self.addr.add(n)) }
    }
}

impl<T> Default for Managed<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for Managed<T> {
    /// Copy-construct: share the source's allocation, incrementing its
    /// registry count. The source must already be registered; a missing
    /// entry panics.
    fn clone(&self) -> Self {
        if !self.addr.is_null() {
            registry::with_global(|r| r.increment_existing(self.addr.cast()));
        }
        Self {
            addr: self.addr,
            shape: self.shape,
            _marker: PhantomData,
        }
    }

    /// Assign from another pointer: release the claim on the current
    /// address, then share the source's allocation.
    fn clone_from(&mut self, source: &Self) {
        let old = self.addr;

        registry::with_global(|r| {
            if !old.is_null() {
                r.decrement(old.cast());
            }
            if !source.addr.is_null() {
                r.increment_existing(source.addr.cast());
            }
        });
        self.addr = source.addr;
        self.shape = source.shape;
    }
}

impl<T> Drop for Managed<T> {
    /// Release this pointer's claim, then sweep: every destruction is a
    /// candidate reclamation point.
    fn drop(&mut self) {
        if !self.addr.is_null() {
            registry::release_claim(self.addr.cast());
        }
        registry::collect();
    }
}

impl<T> Deref for Managed<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics on an unmanaged (null) pointer.
    #[inline]
    fn deref(&self) -> &T {
        assert!(!self.addr.is_null(), "dereference of unmanaged pointer");
        unsafe { &*self.addr }
    }
}

impl<T> DerefMut for Managed<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        assert!(!self.addr.is_null(), "dereference of unmanaged pointer");
        unsafe { &mut *self.addr }
    }
}

impl<T> core::fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Managed")
            .field("addr", &self.addr)
            .field("is_array", &self.shape.is_array)
            .field("array_len", &self.shape.array_len)
            .finish()
    }
}
