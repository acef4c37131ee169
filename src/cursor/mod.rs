//! Bounds-checked cursor over one managed allocation
//!
//! Cursors do not participate in reference counting: holding one never keeps
//! the underlying allocation alive. Bounds are checked on every access, but
//! liveness is the caller's obligation, which is why the accessors are
//! `unsafe`.
//!
//! Moves (advance/retreat/arithmetic) are unclamped; running past either end
//! is only detected on the next access.


use crate::error::{Error, Result};
use core::ops::{Add, Sub};

/// Traversal handle over the `[begin, end)` element range of one allocation.
pub struct Cursor<T> {
    cur: *mut T,
    begin: *mut T,
    end: *mut T,
    len: usize,
}

impl<T> Cursor<T> {
    /// Build a cursor at `cur` over the range `[begin, end)`.
    ///
    /// # Safety
    ///
    /// `begin` and `end` must delimit one allocation's element range, with
    /// `begin <= end`. `cur` may sit anywhere; accesses outside the range
    /// fail with a bounds error.
    pub unsafe fn new(cur: *mut T, begin: *mut T, end: *mut T) -> Self {
        debug_assert!(begin <= end);
        let stride = core::mem::size_of::<T>().max(1);
        let len = (end as usize - begin as usize) / stride;
        Self { cur, begin, end, len }
    }

    /// Number of elements in the range this cursor spans.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Signed element offset of the current position from `begin`.
    #[inline]
    fn position(&self) -> isize {
        let stride = core::mem::size_of::<T>().max(1) as isize;
        (self.cur as isize - self.begin as isize) / stride
    }

    #[inline]
    fn in_range(&self) -> bool {
        self.cur >= self.begin && self.cur < self.end
    }

    /// Read the element at the current position.
    ///
    /// # Safety
    ///
    /// The underlying allocation must still be live; the cursor does not
    /// keep it alive.
    pub unsafe fn get(&self) -> Result<&T> {
        if !self.in_range() {
            return Err(Error::CursorOutOfRange {
                offset: self.position(),
                len: self.len,
            });
        }
        Ok(&*self.cur)
    }

    /// Mutable access to the element at the current position.
    ///
    /// # Safety
    ///
    /// Same liveness contract as [`Cursor::get`].
    pub unsafe fn get_mut(&mut self) -> Result<&mut T> {
        if !self.in_range() {
            return Err(Error::CursorOutOfRange {
                offset: self.position(),
                len: self.len,
            });
        }
        Ok(&mut *self.cur)
    }

    /// Read the element `index` places from the start of the range.
    ///
    /// # Safety
    ///
    /// Same liveness contract as [`Cursor::get`].
    pub unsafe fn at(&self, index: usize) -> Result<&T> {
        if index >= self.len {
            return Err(Error::OutOfRange { index, len: self.len });
        }
        Ok(&*self.begin.add(index))
    }

    /// Mutable access to the element `index` places from the start.
    ///
    /// # Safety
    ///
    /// Same liveness contract as [`Cursor::get`].
    pub unsafe fn at_mut(&mut self, index: usize) -> Result<&mut T> {
        if index >= self.len {
            return Err(Error::OutOfRange { index, len: self.len });
        }
        Ok(&mut *self.begin.add(index))
    }

    /// Move one element forward. Unclamped.
    #[inline]
    pub fn advance(&mut self) {
        self.cur = self.cur.wrapping_add(1);
    }

    /// Move one element backward. Unclamped.
    #[inline]
    pub fn retreat(&mut self) {
        self.cur = self.cur.wrapping_sub(1);
    }
}

impl<T> Default for Cursor<T> {
    /// Empty cursor over no allocation; every access is out of range.
    fn default() -> Self {
        Self {
            cur: core::ptr::null_mut(),
            begin: core::ptr::null_mut(),
            end: core::ptr::null_mut(),
            len: 0,
        }
    }
}

impl<T> Clone for Cursor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<T> {}

impl<T> Add<isize> for Cursor<T> {
    type Output = Cursor<T>;

    /// New cursor shifted forward by `n` elements. Unclamped.
    fn add(mut self, n: isize) -> Cursor<T> {
        self.cur = self.cur.wrapping_offset(n);
        self
    }
}

impl<T> Sub<isize> for Cursor<T> {
    type Output = Cursor<T>;

    /// New cursor shifted backward by `n` elements. Unclamped.
    fn sub(mut self, n: isize) -> Cursor<T> {
        self.cur = self.cur.wrapping_offset(-n);
        self
    }
}

impl<T> Sub for Cursor<T> {
    type Output = isize;

    /// Signed element distance between two cursors over the same allocation.
    fn sub(self, other: Cursor<T>) -> isize {
        let stride = core::mem::size_of::<T>().max(1) as isize;
        (self.cur as isize - other.cur as isize) / stride
    }
}

// Cursors compare by current position only.
impl<T> PartialEq for Cursor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cur == other.cur
    }
}

impl<T> Eq for Cursor<T> {}

impl<T> PartialOrd for Cursor<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Cursor<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.cur.cmp(&other.cur)
    }
}

impl<T> core::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cursor")
            .field("cur", &self.cur)
            .field("begin", &self.begin)
            .field("end", &self.end)
            .finish()
    }
}
