//! The synchronization and reclamation engine.
//!
//! -   The `GenerationCounter` is the logical time of a map, advanced once per
//!     completed write.
//! -   The `ReaderRegistry` records the generation each active reader started
//!     at.
//! -   The `RetiredSet` holds what writes superseded, until no active reader
//!     may still observe it.
//!
//! A retired entry tagged `g` is freed once every active reader started at a
//! generation strictly greater than `g`: the writer unlinks an entry before
//! publishing the generation following its tag, hence a reader which started
//! afterwards cannot reach it.

pub mod generation;
pub mod registry;
pub mod retired;

use super::allocator;
use super::atomic;
use super::boxed;
use super::table;
