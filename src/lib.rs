//! gcptr - manual reference-counted memory management
//!
//! A smart pointer (`Managed<T>`) that tracks every adopted heap allocation
//! in a process-wide registry, counts references on clone/assign/drop, and
//! reclaims memory through a sweep once a count reaches zero. A companion
//! bounds-checked cursor (`Cursor<T>`) traverses array allocations without
//! influencing collection.
//!
//! Known limitation: this is plain reference counting. A reference cycle
//! among managed allocations is never reclaimed by normal operation, only by
//! the shutdown flush.

pub mod cursor;
pub mod error;
pub mod logging;
pub mod pointer;
pub mod registry;

// Re-export core types
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use pointer::Managed;
pub use registry::{
    collect, dump, log_registry, shutdown, tracked_allocations, Entry, EntrySnapshot, Registry,
    Shape,
};

/// Runtime initialization: bring up logging. Optional; the registry itself
/// is created lazily on first use.
pub fn init() {
    logging::init();
}
