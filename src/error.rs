//! Error types for bounds-checked access
//!
//! Only recoverable conditions live here. Corrupted registry bookkeeping
//! (missing entries, shape disagreement) is a programming defect and panics
//! instead of returning through this channel.

use thiserror::Error;

/// Result type local to gcptr.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("index {index} out of range for allocation of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("cursor position {offset} outside valid range of length {len}")]
    CursorOutOfRange { offset: isize, len: usize },
}
