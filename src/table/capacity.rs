//! Capacity of a Table.
//!
//! Apart from holding the capacity itself, assembles various computing
//! primitives based off the capacity: slot indexing, probing, and the load
//! threshold which triggers a resize.

use std::{cmp, hash, mem};

use super::failure::{Failure, Result};

//  Capacity.
//
//  The number of slots of a Table, always a power of 2 and at least 2, so
//  that there is always one empty slot left to terminate a probe.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Capacity {
    log2: u8,
}

impl Capacity {
    //  Creates an instance, rounding to the next power of 2 if necessary.
    //
    //  #   Errors
    //
    //  Returns `CapacityOverflow` if the rounded capacity is not representable.
    pub fn new(requested: usize) -> Result<Self> {
        let requested = cmp::max(requested, 2);
        let log2 = ceil_log2(requested);

        if log2 >= USIZE_BITS {
            return Err(Failure::CapacityOverflow);
        }

        Ok(Self { log2 })
    }

    //  Returns the number of slots.
    pub fn get(self) -> usize { 1usize << self.log2 }

    //  Returns the capacity multiplied by `2 ^ factor_log2`.
    //
    //  #   Errors
    //
    //  Returns `CapacityOverflow` if the result is not representable.
    pub fn grow(self, factor_log2: u8) -> Result<Self> {
        match self.log2.checked_add(factor_log2) {
            Some(log2) if log2 < USIZE_BITS => Ok(Self { log2 }),
            _ => Err(Failure::CapacityOverflow),
        }
    }

    //  Returns the maximum number of occupied slots for the given load factor.
    //
    //  The result is always strictly less than the capacity.
    pub fn threshold(self, max_load_factor: f64) -> usize {
        debug_assert!(max_load_factor > 0.0 && max_load_factor < 1.0);

        let capacity = self.get();
        let threshold = (capacity as f64 * max_load_factor) as usize;

        cmp::min(threshold, capacity - 1)
    }

    //  Returns the slot at which the probe for `hash` starts.
    pub fn index_of(self, hash: Hash) -> SlotIndex {
        SlotIndex(hash.0 & self.mask())
    }

    //  Returns the slot following `index`, wrapping around.
    pub fn next(self, index: SlotIndex) -> SlotIndex {
        SlotIndex((index.0 + 1) & self.mask())
    }

    fn mask(self) -> usize { self.get() - 1 }
}

/// The hash of a key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash(pub usize);

impl Hash {
    //  Hashes `key` with a hasher built by `builder`.
    pub fn of<Q, B>(key: &Q, builder: &B) -> Self
    where
        Q: ?Sized + hash::Hash,
        B: hash::BuildHasher,
    {
        use std::hash::Hasher;

        let mut hasher = builder.build_hasher();
        key.hash(&mut hasher);
        Hash(hasher.finish() as usize)
    }
}

/// The index of a slot, in both Directory and Backing Store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SlotIndex(pub usize);

//  Returns the log2 of a power-of-2 `factor`, if it is a power of 2 greater
//  than or equal to 2.
pub fn factor_log2(factor: usize) -> Option<u8> {
    if factor >= 2 && factor.count_ones() == 1 {
        Some(floor_log2(factor))
    } else {
        None
    }
}

//
//  Implementation Details
//

//  Number of bits in usize.
const USIZE_BITS: u8 = mem::size_of::<usize>() as u8 * 8;

//  Returns the log2 of n, rounded up to the next integer.
//
//  For practical purposes, the log2 of 0 is defined as 0.
fn ceil_log2(n: usize) -> u8 {
    match n {
        0 | 1 => 0,
        _ if n.count_ones() == 1 => USIZE_BITS - 1 - n.leading_zeros() as u8,
        _ => USIZE_BITS - n.leading_zeros() as u8,
    }
}

//  Returns the log2 of n, rounded down to the previous integer.
//
//  For practical purposes, the log2 of 0 is defined as 0.
fn floor_log2(n: usize) -> u8 {
    match n {
        0 | 1 => 0,
        _ => USIZE_BITS - 1 - n.leading_zeros() as u8,
    }
}
