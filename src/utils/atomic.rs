//! A collection of specialized atomics.
//!
//! In theory, it is perfectly possible to use a mixed of Ordering on the same
//! instance of an Atomic, depending on the situation.
//!
//! In practice, it is the author's experience that this is a rarely needed
//! capability which only makes auditing/reviewing harder.
//!
//! Thus, these little types come with pre-established memory ordering.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

macro_rules! atomic {
    ($name:ident, $underlying:ident, $raw:ident, $load_ordering:expr, $store_ordering:expr) => {
        pub struct $name($underlying);

        impl $name {
            pub fn new(v: $raw) -> Self { Self($underlying::new(v)) }
            pub fn load(&self) -> $raw { self.0.load($load_ordering) }
            pub fn store(&self, v: $raw) { self.0.store(v, $store_ordering); }
        }
    }
}

atomic!{ AcqRelU64, AtomicU64, u64, Ordering::Acquire, Ordering::Release }

atomic!{ RelaxedUsize, AtomicUsize, usize, Ordering::Relaxed, Ordering::Relaxed }

//  A pointer published with Release, observed with Acquire.
//
//  A reader which loads a non-null pointer is guaranteed to observe the
//  pointee as it was fully written before the pointer was stored.
pub struct AcqRelPtr<T>(AtomicPtr<T>);

impl<T> AcqRelPtr<T> {
    pub fn new(v: *mut T) -> Self { Self(AtomicPtr::new(v)) }
    pub fn load(&self) -> *mut T { self.0.load(Ordering::Acquire) }
    pub fn store(&self, v: *mut T) { self.0.store(v, Ordering::Release); }
    pub fn swap(&self, v: *mut T) -> *mut T { self.0.swap(v, Ordering::AcqRel) }
}

impl<T> Default for AcqRelPtr<T> {
    fn default() -> Self { Self::new(ptr::null_mut()) }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn acq_rel_ptr_swap() {
    let mut a = 1;
    let mut b = 2;

    let atomic: AcqRelPtr<i32> = AcqRelPtr::default();
    assert!(atomic.load().is_null());

    atomic.store(&mut a as *mut i32);
    let previous = atomic.swap(&mut b as *mut i32);

    assert_eq!(&mut a as *mut i32, previous);
    assert_eq!(&mut b as *mut i32, atomic.load());
}

}
