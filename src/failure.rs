//! The Failure and Result types of this library.
//!
//! The map supports faillible allocations. Any method which attempts to allocate memory, or to register a reader, may
//! fail. The cause of the error is then represented as a `Failure`.
//!
//! All faillible methods come in two versions:
//!
//! -   A faillible `try_xxx` version, which returns a `Result` with `Failure` as the error type.
//! -   A convenience `xxx` version, which invokes the `try_xxx` version and panics in case of error.
//!
//! A failed write never leaves a partial mutation visible to readers, and does not advance the generation.

use std::result;

/// Universal Failure type of this library.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, thiserror::Error)]
pub enum Failure {
    /// The number of bytes to allocate cannot be calculated due to overflowing.
    #[error("allocation size overflows usize")]
    BytesOverflow,
    /// The capacity of the table cannot grow any further without overflowing.
    #[error("table capacity overflows usize")]
    CapacityOverflow,
    /// The allocator could not allocate memory.
    #[error("out of memory")]
    OutOfMemory,
    /// Every slot of the reader registry is in use.
    #[error("no free reader slot")]
    OutOfReaderSlots,
    /// A configuration field is out of range.
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Universal Result type of this library.
pub type Result<T> = result::Result<T, Failure>;

#[cold]
#[inline(never)]
pub(crate) fn panic_from_failure(failure: Failure) -> ! {
    panic!("{}", failure);
}
