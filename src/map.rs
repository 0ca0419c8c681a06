//! #   The RcuMap.
//!
//! The `RcuMap` is a concurrent hash map optimized for reads: any number of
//! threads may read it without taking a lock, while writes are serialized.
//!
//! ##  Under the covers.
//!
//! Under the covers the `RcuMap` is an open-addressing table with linear
//! probing, split in two index-aligned arrays:
//!
//! -   The Directory, which readers probe, holds atomically swappable
//!     references to the records.
//! -   The Backing Store, which only the writer touches, owns the records.
//!
//! Records are never modified, nor moved, once published. An update allocates
//! a new record, swaps it into the Directory, and retires the former one; a
//! resize builds a new table, swaps it in, and retires the former table.
//!
//! Retired entries are reclaimed by generation: each completed write advances
//! the generation of the map, each reader registers the generation it started
//! at, and a retired entry is dropped once every active reader started after
//! the write which retired it.
//!
//! The main consequences are:
//!
//! -   A reader never waits for the writer, nor for another reader.
//! -   A reader which lingers delays reclamation of whatever was retired while
//!     it was active.
//!
//! #   Example: basic
//!
//! ```
//! use rcumap::map::RcuMap;
//!
//! let map: RcuMap<_, _> = RcuMap::new();
//! map.insert("a", 1);
//! map.insert("b", 2);
//!
//! assert_eq!(2, map.len());
//!
//! let guard = map.lock_for_read();
//! assert_eq!(Some(&1), guard.get("a"));
//! assert_eq!(None, guard.get("c"));
//! ```
//!
//! #   Example: sharing is caring
//!
//! The `RcuMap` is `Sync`: readers and writers on any thread share it by
//! reference.
//!
//! ```
//! use std::thread;
//!
//! use rcumap::map::RcuMap;
//!
//! let map: RcuMap<u32, u32> = RcuMap::new();
//! map.extend((0..16).map(|i| (i, i)));
//!
//! thread::scope(|scope| {
//!     scope.spawn(|| {
//!         for i in 0..16 {
//!             map.insert(i, i * 2);
//!         }
//!     });
//!
//!     for _ in 0..4 {
//!         scope.spawn(|| {
//!             let guard = map.lock_for_read();
//!
//!             for i in 0..16 {
//!                 let value = *guard.get(&i).unwrap();
//!                 assert!(value == i || value == i * 2);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(Some(30), map.get_cloned(&15));
//! ```

mod guard;
mod hooks;
mod map;
mod record;

pub use self::guard::{Iter, ReadGuard};
pub use self::hooks::{DefaultHashHooks, HashHooks};
pub use self::map::{Insertion, RcuMap};

use super::allocator;
use super::atomic;
use super::boxed;
use super::config;
use super::failure;
use super::rcu;
use super::table;
