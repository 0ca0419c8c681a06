//! Internal testing utilities

use std::{hash, ptr};
use std::collections::hash_map::DefaultHasher;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::allocator::{Allocator, DefaultAllocator, Layout};
use crate::map::HashHooks;

//  Allocation
//
//  Description of an allocation.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Allocation {
    //  The size of the allocation, in bytes.
    pub size: usize,
    //  The alignment of the allocation, in bytes.
    pub alignment: usize,
    //  The address allocated.
    pub address: usize,
}

impl Allocation {
    pub fn new(pointer: *mut u8, layout: Layout) -> Self {
        Allocation {
            size: layout.size(),
            alignment: layout.align(),
            address: pointer as usize,
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::from_size_align(self.size, self.alignment).unwrap()
    }
}

//  Test Allocator
//
//  An allocator specifically for testing, usable from multiple threads:
//  -   Allows injecting allocation failures.
//  -   Checks that allocations and deallocations match.
pub struct TestAllocator {
    //  The actual allocator.
    allocator: DefaultAllocator,
    //  The number of allocations allowed.
    allowed: AtomicUsize,
    //  The allocations performed; to check deallocation requests.
    allocations: Mutex<Vec<Allocation>>,
}

impl TestAllocator {
    //  Creates an allocator which never fails.
    pub fn unlimited() -> Self { Self::limited(usize::MAX) }

    //  Creates an allocator which fails after `allowed` allocations.
    pub fn limited(allowed: usize) -> Self {
        TestAllocator {
            allocator: DefaultAllocator,
            allowed: AtomicUsize::new(allowed),
            allocations: Mutex::new(Vec::new()),
        }
    }

    //  Sets the number of further allocations allowed.
    pub fn allow(&self, allowed: usize) { self.allowed.store(allowed, Ordering::Relaxed); }

    pub fn allocations(&self) -> Vec<Allocation> {
        self.allocations.lock().clone()
    }

    pub fn allocation_sizes(&self) -> Vec<usize> {
        self.allocations.lock().iter()
            .map(|a| a.size)
            .collect()
    }

    fn clear(&self) {
        for a in self.allocations.lock().drain(..) {
            //  Safety:
            //  -   Were allocated, and not deallocated.
            unsafe { self.allocator.deallocate(a.address as *mut u8, a.layout()) };
        }
    }
}

impl Allocator for TestAllocator {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        let granted = self.allowed.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |allowed| {
            allowed.checked_sub(1)
        });

        if granted.is_err() {
            return ptr::null_mut();
        }

        let result = self.allocator.allocate(layout);
        assert_ne!(ptr::null_mut(), result);

        self.allocations.lock().push(Allocation::new(result, layout));

        result
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        let allocation = Allocation::new(ptr, layout);

        {
            let mut allocations = self.allocations.lock();

            match allocations.iter().position(|a| *a == allocation) {
                Some(index) => { allocations.swap_remove(index); },
                None => panic!("Could not find {:?} in {:?}", allocation, &*allocations),
            }
        }

        self.allocator.deallocate(ptr, layout);
    }
}

impl Drop for TestAllocator {
    fn drop(&mut self) { self.clear() }
}

//  Test Hooks
//
//  Hooks allocating through a `TestAllocator`, with a deterministic hasher.
#[derive(Clone, Copy)]
pub struct TestHooks<'a>(pub &'a TestAllocator);

impl<'a> Allocator for TestHooks<'a> {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 { self.0.allocate(layout) }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) { self.0.deallocate(ptr, layout) }
}

impl<'a> hash::BuildHasher for TestHooks<'a> {
    type Hasher = DefaultHasher;

    fn build_hasher(&self) -> DefaultHasher { DefaultHasher::new() }
}

impl<'a> HashHooks for TestHooks<'a> {}

//  SpyCount
//
//  A counter of the number of instances of elements.
#[derive(Debug)]
pub struct SpyCount(AtomicUsize);

impl SpyCount {
    pub fn zero() -> Self { SpyCount(AtomicUsize::new(0)) }

    pub fn get(&self) -> usize { self.0.load(Ordering::Relaxed) }

    fn decrement(&self) { self.0.fetch_sub(1, Ordering::Relaxed); }

    fn increment(&self) { self.0.fetch_add(1, Ordering::Relaxed); }
}

//  Spy Element
//
//  An element tracking the number of instances, helpful to ensure proper drop.
#[derive(Debug)]
pub struct SpyElement<'a> {
    count: &'a SpyCount,
}

impl<'a> SpyElement<'a> {
    pub fn new(count: &'a SpyCount) -> Self {
        count.increment();
        SpyElement { count }
    }
}

impl<'a> Clone for SpyElement<'a> {
    fn clone(&self) -> Self { SpyElement::new(self.count) }
}

impl<'a> Drop for SpyElement<'a> {
    fn drop(&mut self) {
        self.count.decrement();
    }
}

//  A value which may panic on drop.
#[derive(Debug, Eq, Hash, PartialEq)]
pub struct PanickyDrop<T>(pub T, bool);

impl<T> PanickyDrop<T> {
    //  Creates a normal instance.
    pub fn new(value: T) -> Self { Self(value, false) }

    //  Creates a panicky instance.
    pub fn panicky(value: T) -> Self { Self(value, true) }
}

impl<T> Drop for PanickyDrop<T> {
    fn drop(&mut self) { if self.1 { panic!("Oh No!") } }
}
