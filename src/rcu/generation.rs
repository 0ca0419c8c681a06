//! The Generation Counter.

use std::fmt;

use super::atomic::AcqRelU64;

/// A point in the logical time of a map.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//  The Generation Counter.
//
//  Only ever stored into by the single writer, hence a plain Release store
//  suffices to advance it: there is no concurrent increment to arbitrate.
//
//  A reader which loads generation `g` (Acquire) observes every write the
//  writer performed before publishing `g`.
pub struct GenerationCounter(AcqRelU64);

impl GenerationCounter {
    //  Creates a counter, at generation 0.
    pub fn new() -> Self { Self(AcqRelU64::new(0)) }

    //  Returns the current generation.
    pub fn current(&self) -> Generation { Generation(self.0.load()) }

    //  Advances the counter by one, publishing all prior writes of the
    //  writer; returns the new generation.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    pub unsafe fn publish_increment(&self) -> Generation {
        let current = self.0.load();
        debug_assert!(current < u64::MAX, "Generation exhausted");

        let next = current + 1;
        self.0.store(next);

        Generation(next)
    }
}

impl Default for GenerationCounter {
    fn default() -> Self { Self::new() }
}
