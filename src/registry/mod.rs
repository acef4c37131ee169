//! Allocation registry - ordered bookkeeping list plus the collection sweep
//!
//! Design: one record per distinct managed address, located by linear scan.
//! The sweep removes the first zero-count entry it finds and restarts from
//! the beginning; a single forward pass that deletes while iterating would
//! skip entries shifted by the removal.
//!
//! `Registry` is an ordinary owned value so unit tests can run against
//! independent instances. `Managed<T>` goes through the single process-wide
//! instance, with one mutex acquisition per lifecycle operation.

mod entry;

#[cfg(test)]
mod tests;

pub use entry::{Entry, EntrySnapshot, FreeFn, Shape};

use crate::logging::{
    info, log_allocation, log_deallocation, log_shutdown_flush, log_sweep_complete, trace,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide registry shared by every `Managed<T>`.
static GLOBAL: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::new()));

/// True while the shutdown flush is sweeping the process-wide registry.
static FLUSHING: AtomicBool = AtomicBool::new(false);

/// Ordered collection of bookkeeping entries, keyed by allocation address.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of distinct managed addresses.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Linear lookup by address.
    pub fn find(&self, addr: *mut u8) -> Option<&Entry> {
        self.entries.iter().find(|e| e.addr == addr)
    }

    fn position(&self, addr: *mut u8) -> Option<usize> {
        self.entries.iter().position(|e| e.addr == addr)
    }

    /// Register a fresh allocation, or increment the existing entry when the
    /// address is already managed.
    ///
    /// # Panics
    ///
    /// Panics when an existing entry disagrees on shape: the same address is
    /// being managed with two different declared shapes, which is corrupted
    /// bookkeeping with no recovery path.
    pub fn register_or_increment(
        &mut self,
        addr: *mut u8,
        shape: Shape,
        type_name: &'static str,
        free: FreeFn,
    ) {
        debug_assert!(!addr.is_null());

        match self.position(addr) {
            Some(i) => {
                let entry = &mut self.entries[i];
                assert!(
                    entry.shape == shape,
                    "shape mismatch for address {:?}: registered as {:?}, re-registered as {:?}",
                    addr,
                    entry.shape,
                    shape,
                );
                entry.ref_count += 1;
                trace!(event = "increment", address = ?addr, count = entry.ref_count);
            }
            None => {
                log_allocation(addr, shape.elements());
                self.entries.push(Entry::new(addr, shape, type_name, free));
            }
        }
    }

    /// Increment the entry for an address that must already be registered.
    /// Used by the copy/assign paths, where the source pointer has already
    /// registered the address.
    ///
    /// # Panics
    ///
    /// Panics when the address has no entry. A pointer claims to share an
    /// allocation the registry has never seen; the usual cause is a stack
    /// address handed to a managed pointer.
    pub fn increment_existing(&mut self, addr: *mut u8) {
        let entry = match self.position(addr) {
            Some(i) => &mut self.entries[i],
            None => panic!(
                "no registry entry for shared address {:?}; the source allocation was never registered",
                addr
            ),
        };
        entry.ref_count += 1;
        trace!(event = "increment", address = ?addr, count = entry.ref_count);
    }

    /// Decrement the entry for an address a pointer is releasing.
    ///
    /// # Panics
    ///
    /// Panics when the address has no entry while a pointer believes it is
    /// managing it.
    pub fn decrement(&mut self, addr: *mut u8) {
        let entry = match self.position(addr) {
            Some(i) => &mut self.entries[i],
            None => panic!(
                "no registry entry for managed address {:?}; was a non-heap address adopted?",
                addr
            ),
        };
        if entry.ref_count > 0 {
            entry.ref_count -= 1;
        }
        trace!(event = "decrement", address = ?addr, count = entry.ref_count);
    }

    /// Detach the first zero-count entry, if any. The caller takes over the
    /// obligation to release it.
    pub(crate) fn take_unreferenced(&mut self) -> Option<Entry> {
        let i = self.entries.iter().position(|e| e.ref_count == 0)?;
        Some(self.entries.remove(i))
    }

    /// Sweep the registry, freeing every allocation whose count has reached
    /// zero. Returns whether at least one allocation was freed.
    ///
    /// Removal restarts the scan from the beginning each time, so entries
    /// shifted by a removal are never skipped.
    pub fn collect(&mut self) -> bool {
        let mut freed = 0usize;
        while let Some(entry) = self.take_unreferenced() {
            log_deallocation(entry.address());
            unsafe { entry.release() };
            freed += 1;
        }
        if freed > 0 {
            log_sweep_complete(freed, self.entries.len());
        }
        freed > 0
    }

    /// Force every count to zero and reclaim everything still resident.
    /// Intended for process teardown only; outstanding pointers are ignored.
    pub fn shutdown(&mut self) {
        if self.is_empty() {
            return;
        }
        log_shutdown_flush(self.entries.len());
        self.zero_all_counts();
        self.collect();
    }

    pub(crate) fn zero_all_counts(&mut self) {
        for entry in &mut self.entries {
            entry.ref_count = 0;
        }
    }

    /// Read-only snapshot of every entry.
    pub fn dump(&self) -> Vec<EntrySnapshot> {
        self.entries.iter().map(Entry::snapshot).collect()
    }
}

// ============================================================================
// Process-wide registry operations
// ============================================================================

/// Run `f` under the process-wide registry lock.
pub(crate) fn with_global<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    f(&mut GLOBAL.lock())
}

/// Sweep the process-wide registry. Returns whether anything was freed.
///
/// Entries are detached under the lock but released outside it: a pointee
/// whose own drop destroys more `Managed` values re-enters the registry
/// without deadlocking. Each detachment restarts the scan from the
/// beginning.
pub fn collect() -> bool {
    let mut freed = 0usize;
    loop {
        let victim = GLOBAL.lock().take_unreferenced();
        match victim {
            Some(entry) => {
                log_deallocation(entry.address());
                unsafe { entry.release() };
                freed += 1;
            }
            None => break,
        }
    }
    if freed > 0 {
        log_sweep_complete(freed, tracked_allocations());
    }
    freed > 0
}

/// Release a dropping pointer's claim on `addr`.
///
/// Outside the shutdown flush a missing entry is the usual fatal invariant
/// violation. During the flush the sweep may have already detached the
/// entry for a pointer that is only now being dropped (a pointee that owns
/// further `Managed` values); that is tolerated so teardown never panics
/// inside the exit hook.
pub(crate) fn release_claim(addr: *mut u8) {
    let mut registry = GLOBAL.lock();
    if FLUSHING.load(Ordering::Relaxed) && registry.find(addr).is_none() {
        trace!(event = "flush_release", address = ?addr, "entry already flushed");
        return;
    }
    registry.decrement(addr);
}

/// Flush the process-wide registry: force all counts to zero and reclaim
/// everything still resident. No-op when the registry is empty.
///
/// Pointers still outstanding when this runs must never be used again:
/// their memory is reclaimed out from under them. Their drops are safe,
/// including drops of `Managed` values owned by flushed pointees.
pub fn shutdown() {
    {
        let mut registry = GLOBAL.lock();
        if registry.is_empty() {
            return;
        }
        log_shutdown_flush(registry.len());
        registry.zero_all_counts();
    }
    FLUSHING.store(true, Ordering::Relaxed);
    collect();
    FLUSHING.store(false, Ordering::Relaxed);
}

/// Number of distinct entries in the process-wide registry.
pub fn tracked_allocations() -> usize {
    GLOBAL.lock().len()
}

/// Read-only snapshot of the process-wide registry.
pub fn dump() -> Vec<EntrySnapshot> {
    GLOBAL.lock().dump()
}

/// Emit one structured log event per entry in the process-wide registry.
pub fn log_registry() {
    for snap in dump() {
        info!(
            event = "registry_entry",
            address = snap.address,
            ref_count = snap.ref_count,
            is_array = snap.is_array,
            array_len = snap.array_len,
            pointee = snap.type_name,
        );
    }
}
