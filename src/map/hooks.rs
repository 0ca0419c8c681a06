//! Hooks of the RcuMap.

use std::collections::hash_map;
use std::hash;

use super::allocator;

/// HashHooks
///
/// There are two important hooks for an RcuMap:
/// -   The hashing algorithm.
/// -   The allocator and deallocator functions.
///
/// Every record and every table of the map is obtained from, and returned to,
/// the hooks' allocator. The hooks are shared by the writer and all readers,
/// hence a map is only `Sync` if its hooks are.
///
/// Also see DefaultHashHooks for the default.
pub trait HashHooks: allocator::Allocator + hash::BuildHasher {}

/// DefaultHashHooks
///
/// Default hooks for the RcuMap:
/// -   deferring allocation and deallocation to `DefaultAllocator`.
/// -   hashing with the standard library's `RandomState`.
#[derive(Clone, Debug, Default)]
pub struct DefaultHashHooks(allocator::DefaultAllocator, hash_map::RandomState);

impl allocator::Allocator for DefaultHashHooks {
    unsafe fn allocate(&self, layout: allocator::Layout) -> *mut u8 {
        //  Safety:
        //  -   Forwarding.
        unsafe { self.0.allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: allocator::Layout) {
        //  Safety:
        //  -   Forwarding.
        unsafe { self.0.deallocate(ptr, layout) }
    }
}

impl hash::BuildHasher for DefaultHashHooks {
    type Hasher = hash_map::DefaultHasher;

    fn build_hasher(&self) -> Self::Hasher {
        self.1.build_hasher()
    }
}

impl HashHooks for DefaultHashHooks {}
