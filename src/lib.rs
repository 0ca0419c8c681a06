//  Lints
#![allow(clippy::module_inception)]

//! #   The RcuMap Library
//!
//! A read-optimized concurrent hash map, reclaiming memory with a generation
//! counter variant of read-copy-update.
//!
//! -   Readers never lock: registering, probing and deregistering only take a
//!     handful of atomic operations.
//! -   Writers are serialized, and never modify a published record in place.
//! -   Superseded records and tables are dropped once no reader may observe
//!     them any longer.
//!
//! ```
//! use rcumap::map::RcuMap;
//!
//! let routes: RcuMap<&str, &str> = RcuMap::new();
//! routes.insert("/home", "10.0.0.1");
//!
//! let guard = routes.lock_for_read();
//! assert_eq!(Some(&"10.0.0.1"), guard.get("/home"));
//! ```

pub mod allocator;
pub mod config;
pub mod failure;
pub mod map;

mod rcu;
mod table;
mod utils;

use self::utils::{atomic, boxed};
