//! The Reader Registry.
//!
//! A fixed array of slots, each holding either the generation an active reader
//! started at, or `INACTIVE`. A reader claims a free slot for the duration of
//! its critical section, starting its search at a slot derived from its thread
//! identity, so that readers on distinct threads rarely contend on a slot.
//!
//! Readers only ever touch their own slot, with atomic operations: there is
//! no lock shared between readers.

use std::sync::atomic::{self, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::generation::{Generation, GenerationCounter};

//  Marks a slot which no reader holds.
const INACTIVE: u64 = u64::MAX;

//  The Reader Registry.
pub struct ReaderRegistry {
    slots: Box<[CachePadded<AtomicU64>]>,
}

impl ReaderRegistry {
    //  Creates a registry with room for `slots` concurrent readers.
    pub fn new(slots: usize) -> Self {
        debug_assert!(slots > 0);

        let slots = (0..slots)
            .map(|_| CachePadded::new(AtomicU64::new(INACTIVE)))
            .collect();

        Self { slots }
    }

    //  Returns the number of slots.
    pub fn capacity(&self) -> usize { self.slots.len() }

    //  Registers a reader, at the current generation of `counter`.
    //
    //  Returns `None` if every slot is taken.
    pub fn begin_read(&self, counter: &GenerationCounter) -> Option<ReaderHandle<'_>> {
        let start = thread_hint() % self.slots.len();

        for offset in 0..self.slots.len() {
            let index = (start + offset) % self.slots.len();
            let slot = &self.slots[index];

            if slot.load(Ordering::Relaxed) != INACTIVE {
                continue;
            }

            let generation = counter.current();

            if slot.compare_exchange(INACTIVE, generation.0, Ordering::SeqCst, Ordering::Relaxed).is_err() {
                continue;
            }

            //  Pairs with the fence in `min_active`: either the collector sees
            //  this slot, or this reader sees every unlink which preceded the
            //  collection.
            atomic::fence(Ordering::SeqCst);

            return Some(ReaderHandle { registry: self, index, generation });
        }

        None
    }

    //  Returns the minimum generation across active readers, or `current` if
    //  there is none.
    pub fn min_active(&self, current: Generation) -> Generation {
        atomic::fence(Ordering::SeqCst);

        let minimum = self.slots.iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&generation| generation != INACTIVE)
            .min()
            .unwrap_or(INACTIVE);

        Generation(minimum.min(current.0))
    }

    //  Returns the number of active readers.
    //
    //  The result is only a snapshot, readers may come and go concurrently.
    pub fn active(&self) -> usize {
        self.slots.iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != INACTIVE)
            .count()
    }

    //  Returns whether there is no active reader.
    pub fn is_empty(&self) -> bool { self.active() == 0 }

    //  Releases the slot at `index`.
    //
    //  The Release store orders every read of the reader before the slot is
    //  seen as free by the collector.
    fn end_read(&self, index: usize) {
        debug_assert!(self.slots[index].load(Ordering::Relaxed) != INACTIVE);

        self.slots[index].store(INACTIVE, Ordering::Release);
    }
}

//  The registration of an active reader.
//
//  Dropping the handle deregisters the reader, exactly once.
pub struct ReaderHandle<'a> {
    registry: &'a ReaderRegistry,
    index: usize,
    generation: Generation,
}

impl<'a> ReaderHandle<'a> {
    //  Returns the generation the reader started at.
    pub fn generation(&self) -> Generation { self.generation }
}

impl<'a> Drop for ReaderHandle<'a> {
    fn drop(&mut self) { self.registry.end_read(self.index); }
}

//
//  Implementation Details
//

//  Source of thread hints.
static NEXT_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HINT: usize = NEXT_HINT.fetch_add(1, Ordering::Relaxed);
}

//  Returns a number unique to the current thread, as long as there are fewer
//  than `usize::MAX` threads.
fn thread_hint() -> usize { HINT.with(|hint| *hint) }
