//! The Directory and Backing Store pair.
//!
//! Slot `i` of the Directory, when occupied, references the record owned by
//! slot `i` of the Backing Store. Records are individually allocated, so that
//! swapping a slot never moves a record in memory: a reader which obtained a
//! reference before the swap keeps a valid reference until the record is
//! reclaimed.
//!
//! A Directory slot is in one of three states:
//!
//! -   Empty: null, terminates a probe.
//! -   Tombstone: a removed record, the probe continues past it.
//! -   Occupied: references a fully constructed record.

use std::{borrow, cell, hash, iter, slice};
use std::ptr::{self, NonNull};

use super::allocator::Allocator;
use super::array::Array;
use super::atomic::AcqRelPtr;
use super::boxed;
use super::capacity::{Capacity, Hash, SlotIndex};
use super::failure::Result;
use super::key::Key;

use self::borrow::Borrow;

/// The Directory and Backing Store of a map.
pub struct Table<T> {
    capacity: Capacity,
    //  Non-owning references, read concurrently.
    directory: Array<AcqRelPtr<T>>,
    //  Owning references, writer-only.
    store: Array<Owned<T>>,
}

impl<T> Table<T> {
    //  Allocates an empty table of the given capacity.
    //
    //  #   Errors
    //
    //  Returns an error if any allocation fails, in which case nothing is
    //  left allocated.
    pub fn allocate<A: Allocator>(capacity: Capacity, allocator: &A) -> Result<NonNull<Self>> {
        let header = boxed::allocate_uninit::<Self, A>(allocator)?;

        let directory = match Array::allocate(capacity.get(), allocator) {
            Ok(directory) => directory,
            Err(failure) => {
                //  Safety:
                //  -   Allocated with `allocator`, just above, never initialized.
                unsafe { boxed::deallocate(header, allocator) };
                return Err(failure);
            },
        };

        let store = match Array::allocate(capacity.get(), allocator) {
            Ok(store) => store,
            Err(failure) => {
                //  Safety:
                //  -   Allocated with `allocator`, just above, never initialized.
                unsafe {
                    directory.deallocate(allocator);
                    boxed::deallocate(header, allocator);
                }
                return Err(failure);
            },
        };

        //  Safety:
        //  -   `header` is valid for writes, and suitably aligned.
        unsafe { ptr::write(header.as_ptr(), Table { capacity, directory, store }) };

        Ok(header)
    }

    //  Drops every record still owned by the Backing Store, then deallocates
    //  the arrays and the table itself.
    //
    //  #   Safety
    //
    //  -   Assumes that `table` was allocated with `allocator`.
    //  -   Assumes that no reader may observe the table, or any of the records
    //      it owns, any longer.
    pub unsafe fn release<A: Allocator>(table: NonNull<Self>, allocator: &A) {
        let Table { directory, store, .. } = ptr::read(table.as_ptr());

        for slot in store.as_slice() {
            if let Some(record) = slot.take() {
                boxed::release(record, allocator);
            }
        }

        directory.deallocate(allocator);
        store.deallocate(allocator);

        //  The content was moved out just above.
        boxed::deallocate(table, allocator);
    }

    //  Returns the capacity.
    pub fn capacity(&self) -> Capacity { self.capacity }

    //  Returns an iterator over the occupied slots of the Directory.
    //
    //  #   Safety
    //
    //  -   Assumes that the caller is a registered reader, or the writer, for
    //      the whole lifetime of the iterator.
    pub unsafe fn iter(&self) -> Iter<'_, T> {
        Iter { slots: self.directory.as_slice().iter() }
    }

    //  Returns the state of the slot at `index`.
    //
    //  #   Safety
    //
    //  -   Assumes that the caller is a registered reader, or the writer.
    unsafe fn slot(&self, index: SlotIndex) -> Slot<'_, T> {
        Slot::of(self.directory[index.0].load())
    }
}

impl<T: Key> Table<T> {
    //  Looks up the record whose key matches.
    //
    //  Stops at the first empty slot, skipping over tombstones, and never
    //  scans more than the full capacity.
    //
    //  #   Safety
    //
    //  -   Assumes that the caller is a registered reader, or the writer, for
    //      the lifetime of the returned reference.
    pub unsafe fn lookup<Q>(&self, key: &Q, hash: Hash) -> Option<&T>
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut index = self.capacity.index_of(hash);

        for _ in 0..self.capacity.get() {
            match self.slot(index) {
                Slot::Empty => return None,
                Slot::Tombstone => (),
                Slot::Occupied(record) => {
                    if record.key().borrow() == key {
                        return Some(record);
                    }
                },
            }

            index = self.capacity.next(index);
        }

        None
    }

    //  Looks up the slot of the record whose key matches, or the slot at which
    //  it could be inserted.
    //
    //  A tombstone is only offered for insertion once the key is known to be
    //  absent from the remainder of the probe sequence.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    pub unsafe fn probe<Q>(&self, key: &Q, hash: Hash) -> Probe
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut index = self.capacity.index_of(hash);
        let mut tombstone = None;

        for _ in 0..self.capacity.get() {
            match self.slot(index) {
                Slot::Empty => {
                    return match tombstone {
                        Some(index) => Probe::Vacant { index, tombstone: true },
                        None => Probe::Vacant { index, tombstone: false },
                    };
                },
                Slot::Tombstone => {
                    tombstone = tombstone.or(Some(index));
                },
                Slot::Occupied(record) => {
                    if record.key().borrow() == key {
                        return Probe::Found(index);
                    }
                },
            }

            index = self.capacity.next(index);
        }

        match tombstone {
            Some(index) => Probe::Vacant { index, tombstone: true },
            None => Probe::Full,
        }
    }

    //  Stores `record` in the Backing Store at `index`, then publishes it in
    //  the Directory.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    //  -   Assumes that `index` was returned as `Probe::Vacant` by `probe`,
    //      with no write in between.
    //  -   Assumes that `record` was allocated with the allocator of the map.
    pub unsafe fn place(&self, index: SlotIndex, record: NonNull<T>) {
        debug_assert!(!matches!(self.slot(index), Slot::Occupied(_)));

        let previous = self.store[index.0].replace(Some(record));
        debug_assert!(previous.is_none());

        self.directory[index.0].store(record.as_ptr());
    }

    //  Swaps the record at `index` for `record`, returning the former one.
    //
    //  The Directory slot is swapped in a single atomic operation, so that a
    //  concurrent reader observes either record, and never an empty slot.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    //  -   Assumes that `index` was returned as `Probe::Found` by `probe`, with
    //      no write in between.
    pub unsafe fn replace(&self, index: SlotIndex, record: NonNull<T>) -> NonNull<T> {
        let previous = self.store[index.0].replace(Some(record));
        let published = self.directory[index.0].swap(record.as_ptr());

        match previous {
            Some(previous) => {
                debug_assert_eq!(previous.as_ptr(), published);
                previous
            },
            None => {
                //  Safety:
                //  -   `index` is occupied, per pre-condition.
                debug_assert!(false, "No record at {:?}", index);
                std::hint::unreachable_unchecked()
            },
        }
    }

    //  Replaces the record at `index` by a tombstone, returning the record.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    //  -   Assumes that `index` was returned as `Probe::Found` by `probe`, with
    //      no write in between.
    pub unsafe fn bury(&self, index: SlotIndex) -> NonNull<T> {
        let published = self.directory[index.0].swap(tombstone());

        match self.store[index.0].take() {
            Some(previous) => {
                debug_assert_eq!(previous.as_ptr(), published);
                previous
            },
            None => {
                //  Safety:
                //  -   `index` is occupied, per pre-condition.
                debug_assert!(false, "No record at {:?}", index);
                std::hint::unreachable_unchecked()
            },
        }
    }

    //  Clears the slot at `index`, in both Directory and Backing Store,
    //  returning the record it owned, if any.
    //
    //  Clearing a slot breaks the probe sequences running through it; this is
    //  only suitable when no reader can observe the table.
    //
    //  #   Safety
    //
    //  -   Assumes exclusive access, no reader nor writer.
    pub unsafe fn vacate(&self, index: SlotIndex) -> Option<NonNull<T>> {
        self.directory[index.0].store(ptr::null_mut());
        self.store[index.0].take()
    }

    //  Moves ownership of every record into `target`, hashing with `builder`.
    //
    //  The Directory of `self` is left untouched, so that readers which
    //  already observed `self` keep observing a complete table. Records are not
    //  moved in memory, only their ownership is.
    //
    //  Returns the number of records migrated.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    //  -   Assumes that `target` is not yet visible to any reader, and has
    //      strictly more slots than `self` has records.
    pub unsafe fn migrate<B>(&self, target: &Table<T>, builder: &B) -> usize
    where
        T::Key: hash::Hash,
        B: hash::BuildHasher,
    {
        let mut migrated = 0;

        for slot in self.store.as_slice() {
            let record = match slot.take() {
                Some(record) => record,
                None => continue,
            };

            let hash = Hash::of(record.as_ref().key(), builder);
            let index = target.first_empty(hash);

            target.place(index, record);
            migrated += 1;
        }

        migrated
    }

    //  Returns the first empty slot of the probe sequence of `hash`.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer thread.
    //  -   Assumes that there is at least one empty slot.
    unsafe fn first_empty(&self, hash: Hash) -> SlotIndex {
        let mut index = self.capacity.index_of(hash);

        for _ in 0..self.capacity.get() {
            if let Slot::Empty = self.slot(index) {
                return index;
            }

            index = self.capacity.next(index);
        }

        //  Safety:
        //  -   At least one slot is empty, per pre-condition.
        debug_assert!(false, "No empty slot in {:?}", self.capacity);
        std::hint::unreachable_unchecked()
    }
}

/// The outcome of probing for a key, on the writer side.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Probe {
    //  The key is present at this index.
    Found(SlotIndex),
    //  The key is absent, and could be inserted at this index.
    //
    //  `tombstone` indicates whether the slot is a reused tombstone, in
    //  which case inserting does not increase the number of occupied slots.
    Vacant { index: SlotIndex, tombstone: bool },
    //  The key is absent, and there is no room for it.
    Full,
}

/// An iterator over the records of a Table.
pub struct Iter<'a, T> {
    slots: slice::Iter<'a, AcqRelPtr<T>>,
}

impl<'a, T> iter::Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        for slot in self.slots.by_ref() {
            //  Safety:
            //  -   The caller of `Table::iter` is registered, per pre-condition.
            if let Slot::Occupied(record) = unsafe { Slot::of(slot.load()) } {
                return Some(record);
            }
        }

        None
    }
}

//
//  Implementation Details
//

//  The state of a Directory slot.
enum Slot<'a, T> {
    Empty,
    Tombstone,
    Occupied(&'a T),
}

impl<'a, T> Slot<'a, T> {
    //  Classifies a pointer loaded from the Directory.
    //
    //  #   Safety
    //
    //  -   Assumes that a non-null, non-tombstone `ptr` points to a record
    //      which remains alive for `'a`.
    unsafe fn of(ptr: *mut T) -> Self {
        if ptr.is_null() {
            Slot::Empty
        } else if ptr == tombstone() {
            Slot::Tombstone
        } else {
            Slot::Occupied(&*ptr)
        }
    }
}

//  An owning reference to a record, in the Backing Store.
//
//  Only ever accessed by the writer.
struct Owned<T>(cell::Cell<Option<NonNull<T>>>);

impl<T> Owned<T> {
    fn take(&self) -> Option<NonNull<T>> { self.0.take() }

    fn replace(&self, record: Option<NonNull<T>>) -> Option<NonNull<T>> {
        self.0.replace(record)
    }
}

impl<T> Default for Owned<T> {
    fn default() -> Self { Owned(cell::Cell::new(None)) }
}

//  The address of this static is never handed out by an allocator, and thus
//  never collides with a record.
static TOMBSTONE: u8 = 0;

//  The marker stored in the Directory in place of a removed record.
//
//  Never dereferenced.
fn tombstone<T>() -> *mut T { &TOMBSTONE as *const u8 as *mut T }
