//! The ReadGuard of the RcuMap.
//!
//! A `ReadGuard` is the critical section of a reader: while it lives, nothing
//! it may observe is reclaimed. Every reference it hands out borrows the guard,
//! and thus cannot outlive it.

use std::{borrow, fmt, hash, iter, marker};
use std::ptr::NonNull;

use super::atomic::AcqRelPtr;
use super::hooks::HashHooks;
use super::rcu::registry::ReaderHandle;
use super::record::Record;
use super::table::{self, Table};
use super::table::capacity::Hash;

/// `ReadGuard`
///
/// A registered reader of an `RcuMap`.
///
/// Each look-up observes the table current at the time of the look-up, and
/// thus reflects any write completed before it started.
///
/// A guard pins every record it may have observed; long-lived guards delay
/// reclamation.
pub struct ReadGuard<'a, K, V, H> {
    root: &'a AcqRelPtr<Table<Record<K, V>>>,
    hooks: &'a H,
    handle: ReaderHandle<'a>,
    _marker: marker::PhantomData<&'a Record<K, V>>,
}

impl<'a, K, V, H: HashHooks> ReadGuard<'a, K, V, H> {
    //  Creates a new instance.
    pub(crate) fn new(
        root: &'a AcqRelPtr<Table<Record<K, V>>>,
        hooks: &'a H,
        handle: ReaderHandle<'a>,
    )
        -> Self
    {
        Self { root, hooks, handle, _marker: marker::PhantomData }
    }

    /// Returns the generation observed when the guard was acquired.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, "one");
    ///
    /// let guard = map.lock_for_read();
    /// map.insert(2, "two");
    ///
    /// assert_eq!(1, guard.generation());
    /// assert_eq!(2, map.generation());
    /// ```
    pub fn generation(&self) -> u64 { self.handle.generation().0 }

    /// Returns the capacity of the current table, 0 if none was allocated yet.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// assert_eq!(0, map.lock_for_read().capacity());
    ///
    /// map.insert(1, "one");
    /// assert_eq!(16, map.lock_for_read().capacity());
    /// ```
    pub fn capacity(&self) -> usize {
        self.table().map(|table| table.capacity().get()).unwrap_or(0)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, false);
    ///
    /// let guard = map.lock_for_read();
    /// assert!(guard.contains_key(&1));
    /// assert!(!guard.contains_key(&0));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        self.record(key).is_some()
    }

    /// Returns a reference to the value corresponding to the key, if any.
    ///
    /// The reference is valid for as long as the guard is.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert("a", 1);
    ///
    /// let guard = map.lock_for_read();
    /// let value = guard.get("a");
    ///
    /// //  The update does not affect `value`, which remains readable.
    /// map.insert("a", 2);
    ///
    /// assert_eq!(Some(&1), value);
    /// assert_eq!(Some(&2), guard.get("a"));
    /// assert_eq!(None, guard.get("b"));
    /// ```
    ///
    /// A reference cannot outlive its guard.
    ///
    /// ```compile_fail
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert("a", 1);
    ///
    /// let value = {
    ///     let guard = map.lock_for_read();
    ///     guard.get("a")
    /// };
    ///
    /// assert_eq!(Some(&1), value);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        self.record(key).map(|r| &r.value)
    }

    /// Returns the key-value pair corresponding to the key, if any.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, false);
    ///
    /// let guard = map.lock_for_read();
    /// assert_eq!(Some((&1, &false)), guard.get_key_value(&1));
    /// assert_eq!(None, guard.get_key_value(&0));
    /// ```
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        self.record(key).map(|r| (&r.key, &r.value))
    }

    /// Returns an iterator over the key-value pairs of the table current at
    /// the time of the call, in unspecified order.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.extend([(1, 10), (2, 20), (3, 30)]);
    ///
    /// let guard = map.lock_for_read();
    ///
    /// let mut pairs: Vec<_> = guard.iter().map(|(&k, &v)| (k, v)).collect();
    /// pairs.sort();
    ///
    /// assert_eq!(vec![(1, 10), (2, 20), (3, 30)], pairs);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        //  Safety:
        //  -   The reader is registered for the lifetime of `self`.
        Iter { inner: self.table().map(|table| unsafe { table.iter() }) }
    }

    //  Returns the current table, if any.
    fn table(&self) -> Option<&Table<Record<K, V>>> {
        let table = NonNull::new(self.root.load())?;

        //  Safety:
        //  -   The reader is registered for the lifetime of `self`, hence any
        //      table it loads is not reclaimed before `self` is dropped.
        Some(unsafe { table.as_ref() })
    }

    //  Returns the record matching `key`, if any.
    fn record<Q>(&self, key: &Q) -> Option<&Record<K, V>>
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        let table = self.table()?;
        let hash = Hash::of(key, self.hooks);

        //  Safety:
        //  -   The reader is registered for the lifetime of `self`.
        unsafe { table.lookup(key, hash) }
    }
}

impl<'a, K: fmt::Debug, V: fmt::Debug, H: HashHooks> fmt::Debug for ReadGuard<'a, K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'g, 'a, K, V, H: HashHooks> IntoIterator for &'g ReadGuard<'a, K, V, H> {
    type Item = (&'g K, &'g V);
    type IntoIter = Iter<'g, K, V>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

/// An iterator over the key-value pairs observed by a `ReadGuard`.
pub struct Iter<'a, K, V> {
    inner: Option<table::Iter<'a, Record<K, V>>>,
}

impl<'a, K, V> iter::Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next().map(|r| (&r.key, &r.value))
    }
}

#[cfg(test)]
mod tests {

use crate::map::RcuMap;
use crate::utils::tester::*;

#[test]
fn guard_registers_and_deregisters() {
    let allocator = TestAllocator::unlimited();
    let map: RcuMap<u32, u32, _> = RcuMap::with_hooks(TestHooks(&allocator));

    {
        let first = map.lock_for_read();
        let second = map.lock_for_read();

        assert_eq!(2, map.active_readers());
        assert_eq!(0, first.generation());
        assert_eq!(0, second.capacity());
        assert_eq!(None, first.get(&1));
        assert_eq!(0, first.iter().count());
    }

    assert_eq!(0, map.active_readers());
}

#[test]
fn guard_sees_later_writes() {
    let allocator = TestAllocator::unlimited();
    let map: RcuMap<u32, &'static str, _> = RcuMap::with_hooks(TestHooks(&allocator));

    let guard = map.lock_for_read();
    assert_eq!(None, guard.get(&1));

    map.insert(1, "one");
    assert_eq!(Some(&"one"), guard.get(&1));

    map.insert(1, "uno");
    assert_eq!(Some((&1, &"uno")), guard.get_key_value(&1));
}

#[test]
fn guard_pins_across_resize() {
    let allocator = TestAllocator::unlimited();
    let map: RcuMap<u32, u32, _> = RcuMap::with_hooks(TestHooks(&allocator));

    map.insert(0, 0);

    let guard = map.lock_for_read();
    let zero = guard.get(&0).unwrap();
    let iter = guard.iter();

    for i in 1..100 {
        map.insert(i, i);
    }

    //  The former table and its records are still alive, holding the 9 keys
    //  inserted before it was retired.
    assert_eq!(&0, zero);

    let mut former: Vec<_> = iter.map(|(key, value)| (*key, *value)).collect();
    former.sort();

    assert_eq!((0..=8).map(|i| (i, i)).collect::<Vec<_>>(), former);
    assert!(map.retired_len() > 0);

    assert_eq!(100, guard.iter().count());
    assert_eq!(Some(&42), guard.get(&42));

    drop(guard);

    map.collect();
    assert_eq!(0, map.retired_len());
}

#[test]
fn guard_debug() {
    let allocator = TestAllocator::unlimited();
    let map: RcuMap<u32, u32, _> = RcuMap::with_hooks(TestHooks(&allocator));

    map.insert(7, 49);

    assert_eq!("{7: 49}", format!("{:?}", map.lock_for_read()));
}

}
