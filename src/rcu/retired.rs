//! The Retired Set, and its Garbage Collector.
//!
//! Whatever a write supersedes, be it a single record or a whole table after a
//! resize, is retired here rather than released immediately: a reader which
//! started before the write may still be looking at it.
//!
//! Each entry is tagged with the generation current at the time of the write,
//! that is before its publication. An entry tagged `g` is released once the
//! minimum generation across active readers is strictly greater than `g`.

use std::ptr::NonNull;

use super::allocator::Allocator;
use super::boxed;
use super::generation::Generation;
use super::table::Table;
use crate::failure::{Failure, Result};

//  The Retired Set.
//
//  Only ever accessed by the writer.
pub struct RetiredSet<T> {
    entries: Vec<Retired<T>>,
}

impl<T> RetiredSet<T> {
    //  Creates an empty set.
    pub fn new() -> Self { Self { entries: Vec::new() } }

    //  Returns the number of entries awaiting collection.
    pub fn len(&self) -> usize { self.entries.len() }

    //  Returns whether no entry awaits collection.
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    //  Reserves room for `additional` entries, so that retiring them cannot
    //  fail half-way through a write.
    //
    //  #   Errors
    //
    //  Returns `OutOfMemory` if the room cannot be reserved.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.entries.try_reserve(additional).map_err(|_| Failure::OutOfMemory)
    }

    //  Retires a record, unlinked from the Directory during `generation`.
    pub fn retire_record(&mut self, record: NonNull<T>, generation: Generation) {
        debug_assert!(self.entries.len() < self.entries.capacity());

        self.entries.push(Retired { generation, garbage: Garbage::Record(record) });
    }

    //  Retires a table, replaced as root during `generation`.
    //
    //  The records the table owned must have been migrated beforehand.
    pub fn retire_table(&mut self, table: NonNull<Table<T>>, generation: Generation) {
        debug_assert!(self.entries.len() < self.entries.capacity());

        self.entries.push(Retired { generation, garbage: Garbage::Table(table) });
    }

    //  Releases every entry tagged strictly before `min_active`, returns the
    //  number of entries released.
    //
    //  #   Safety
    //
    //  -   Assumes that `min_active` is no greater than the generation of any
    //      active reader.
    //  -   Assumes that `allocator` is the one every entry was allocated with.
    pub unsafe fn collect<A: Allocator>(&mut self, min_active: Generation, allocator: &A) -> usize {
        let mut released = 0;
        let mut index = 0;

        while index < self.entries.len() {
            if self.entries[index].generation < min_active {
                //  Removed before release, a panicking drop merely leaks.
                let entry = self.entries.swap_remove(index);
                entry.garbage.release(allocator);
                released += 1;
            } else {
                index += 1;
            }
        }

        released
    }

    //  Releases every entry, regardless of its tag.
    //
    //  #   Safety
    //
    //  -   Assumes that there is no active reader.
    //  -   Assumes that `allocator` is the one every entry was allocated with.
    pub unsafe fn release_all<A: Allocator>(&mut self, allocator: &A) {
        while let Some(entry) = self.entries.pop() {
            entry.garbage.release(allocator);
        }
    }
}

impl<T> Default for RetiredSet<T> {
    fn default() -> Self { Self::new() }
}

//
//  Implementation Details
//

//  A Retired Entry.
struct Retired<T> {
    generation: Generation,
    garbage: Garbage<T>,
}

//  What a write superseded.
enum Garbage<T> {
    Record(NonNull<T>),
    Table(NonNull<Table<T>>),
}

impl<T> Garbage<T> {
    //  #   Safety
    //
    //  -   Assumes that no reader may observe the garbage any longer.
    //  -   Assumes that `allocator` is the one the garbage was allocated with.
    unsafe fn release<A: Allocator>(self, allocator: &A) {
        match self {
            Garbage::Record(record) => boxed::release(record, allocator),
            Garbage::Table(table) => Table::release(table, allocator),
        }
    }
}
