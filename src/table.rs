//! Internal definition of the Table: the Directory and Backing Store pair.
//!
//! The Directory is an array of atomically swappable, non-owning references
//! which readers probe. The Backing Store is an index-aligned array of owning
//! references which only the writer touches.

pub mod array;
pub mod capacity;
pub mod key;

mod table;

pub use self::table::{Iter, Probe, Table};

use super::allocator;
use super::atomic;
use super::boxed;
use super::failure;
