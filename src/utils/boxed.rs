//! Single values allocated through an `Allocator`.
//!
//! Records and table headers live at a stable address from allocation to
//! release, so that a reader holding a reference is never affected by the
//! writer moving ownership of the value around.

use std::ptr::{self, NonNull};

use crate::allocator::{Allocator, Layout};
use crate::failure::{Failure, Result};

//  Moves `value` into memory obtained from `allocator`.
//
//  #   Errors
//
//  Returns `OutOfMemory` if the allocator returns null, in which case `value`
//  is dropped.
//
//  #   Panics
//
//  Panics if `T` is zero-sized.
pub fn allocate<T, A: Allocator>(value: T, allocator: &A) -> Result<NonNull<T>> {
    let ptr = allocate_uninit::<T, A>(allocator)?;

    //  Safety:
    //  -   `ptr` is valid for writes, and suitably aligned.
    unsafe { ptr::write(ptr.as_ptr(), value) };

    Ok(ptr)
}

//  Obtains memory suitable for a `T` from `allocator`, uninitialized.
//
//  #   Errors
//
//  Returns `OutOfMemory` if the allocator returns null.
//
//  #   Panics
//
//  Panics if `T` is zero-sized.
pub fn allocate_uninit<T, A: Allocator>(allocator: &A) -> Result<NonNull<T>> {
    let layout = Layout::new::<T>();
    assert_ne!(0, layout.size(), "Zero-sized values are not supported");

    //  Safety:
    //  -   The size of the layout is non-zero.
    let ptr = unsafe { allocator.allocate(layout) } as *mut T;

    NonNull::new(ptr).ok_or(Failure::OutOfMemory)
}

//  Drops the value, and returns its memory to `allocator`.
//
//  #   Safety
//
//  -   Assumes that `ptr` was obtained from `allocate` with the same allocator.
//  -   Assumes that `ptr` is not used afterwards, by any thread.
pub unsafe fn release<T, A: Allocator>(ptr: NonNull<T>, allocator: &A) {
    ptr::drop_in_place(ptr.as_ptr());
    deallocate(ptr, allocator);
}

//  Returns the memory to `allocator`, without dropping its content.
//
//  #   Safety
//
//  -   Assumes that `ptr` was obtained from `allocate_uninit`, or `allocate`,
//      with the same allocator.
//  -   Assumes that `ptr` is not used afterwards, by any thread.
pub unsafe fn deallocate<T, A: Allocator>(ptr: NonNull<T>, allocator: &A) {
    allocator.deallocate(ptr.as_ptr() as *mut u8, Layout::new::<T>());
}
