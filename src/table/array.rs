//! Fixed-capacity arrays allocated through an `Allocator`.

use std::{marker, mem, ptr, slice};
use std::ptr::NonNull;

use super::allocator::{Allocator, Layout};
use super::failure::{Failure, Result};

//  A fixed-capacity array of default-initialized elements.
//
//  The array does not release its memory on drop: it must be explicitly
//  deallocated with the allocator it was allocated with.
pub struct Array<E> {
    ptr: NonNull<E>,
    len: usize,
    _marker: marker::PhantomData<E>,
}

impl<E: Default> Array<E> {
    //  Allocates an array of `len` elements, and initializes each element.
    //
    //  #   Errors
    //
    //  Returns `BytesOverflow` if the size in bytes overflows, and
    //  `OutOfMemory` if the allocator fails.
    pub fn allocate<A: Allocator>(len: usize, allocator: &A) -> Result<Self> {
        debug_assert!(len > 0);
        debug_assert!(mem::size_of::<E>() > 0);

        let layout = Self::allocation_layout(len)?;

        //  Safety:
        //  -   The layout is valid, and non-zero sized.
        let ptr = unsafe { allocator.allocate(layout) } as *mut E;

        let ptr = NonNull::new(ptr).ok_or(Failure::OutOfMemory)?;

        for offset in 0..len {
            //  Safety:
            //  -   The result is within bounds of the allocation.
            unsafe { ptr::write(ptr.as_ptr().add(offset), E::default()) };
        }

        Ok(Self { ptr, len, _marker: marker::PhantomData })
    }
}

impl<E> Array<E> {
    //  Returns the elements.
    pub fn as_slice(&self) -> &[E] {
        //  Safety:
        //  -   `ptr` points to `len` initialized elements.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    //  Drops the elements, and deallocates the array.
    //
    //  #   Safety
    //
    //  -   Assumes that `allocator` is the one the array was allocated with.
    pub unsafe fn deallocate<A: Allocator>(self, allocator: &A) {
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));

        let layout = match Self::allocation_layout(self.len) {
            Ok(layout) => layout,
            Err(_) => {
                //  Safety:
                //  -   Cannot error, it succeeded during the allocation.
                debug_assert!(false, "{} succeeded in allocation!", self.len);
                std::hint::unreachable_unchecked()
            },
        };

        allocator.deallocate(self.ptr.as_ptr() as *mut u8, layout);
    }

    //  Computes the layout for a given length.
    //
    //  #   Fails
    //
    //  -   If the necessary size overflows.
    fn allocation_layout(len: usize) -> Result<Layout> {
        Layout::array::<E>(len).map_err(|_| Failure::BytesOverflow)
    }
}

impl<E> std::ops::Index<usize> for Array<E> {
    type Output = E;

    fn index(&self, index: usize) -> &E { &self.as_slice()[index] }
}
