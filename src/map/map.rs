//! The RcuMap

use std::{borrow, fmt, hash, hint, iter, marker};
use std::ptr::{self, NonNull};

use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, trace, Level};

use super::ReadGuard;

use super::atomic::{AcqRelPtr, RelaxedUsize};
use super::boxed;
use super::config::Config;
use super::failure::{panic_from_failure, Failure, Result};
use super::hooks::{DefaultHashHooks, HashHooks};
use super::rcu::generation::{Generation, GenerationCounter};
use super::rcu::registry::ReaderRegistry;
use super::rcu::retired::RetiredSet;
use super::record::Record;
use super::table::{Probe, Table};
use super::table::capacity::{Capacity, Hash, SlotIndex};

//
//  Public Interface
//

/// `RcuMap`
///
/// A hash map written by one writer at a time, and read concurrently without
/// locking.
pub struct RcuMap<K, V, H: HashHooks = DefaultHashHooks> {
    //  Hooks of the RcuMap.
    hooks: H,
    config: Config,
    //  Capacity of the first table.
    initial: Capacity,
    growth_log2: u8,
    //  The current table, null until the first insertion.
    //
    //  Swapped by the writer on resize, the former table is then retired.
    root: AcqRelPtr<Table<Record<K, V>>>,
    generation: GenerationCounter,
    registry: ReaderRegistry,
    //  Diagnostics, mirroring the writer state as of the last write.
    len: RelaxedUsize,
    capacity: RelaxedUsize,
    writer: Mutex<WriterState<Record<K, V>>>,
    _marker: marker::PhantomData<Record<K, V>>,
}

/// The outcome of an insertion.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Insertion {
    /// The key was absent, and has been inserted.
    Inserted,
    /// The key was present, its value has been replaced.
    Updated,
}

impl<K, V, H: HashHooks + Default> RcuMap<K, V, H> {
    /// Creates a new instance of the `RcuMap`, with the default configuration.
    ///
    /// No memory is allocated until the first insertion.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<i32, i32> = RcuMap::new();
    ///
    /// assert_eq!(0, map.len());
    /// assert_eq!(0, map.capacity());
    /// assert_eq!(0, map.generation());
    /// ```
    pub fn new() -> Self { Self::with_hooks(H::default()) }

    /// Creates a new instance of the `RcuMap`, with the given configuration.
    ///
    /// No memory is allocated until the first insertion.
    ///
    /// #   Panics
    ///
    /// Panics if the configuration is invalid.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::config::Config;
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<i32, i32> = RcuMap::with_config(Config::default().with_initial_capacity(3));
    ///
    /// map.insert(1, 1);
    /// assert_eq!(4, map.capacity());
    /// ```
    pub fn with_config(config: Config) -> Self {
        Self::try_with_config(config).unwrap_or_else(|failure| panic_from_failure(failure))
    }

    /// Creates a new instance of the `RcuMap`, with the given configuration.
    ///
    /// #   Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::config::Config;
    /// #   use rcumap::failure::Failure;
    /// #   use rcumap::map::RcuMap;
    /// let config = Config::default().with_max_load_factor(1.0);
    /// let map: Result<RcuMap<i32, i32>, _> = RcuMap::try_with_config(config);
    ///
    /// assert_eq!(Some(Failure::InvalidConfig { field: "max_load_factor" }), map.err());
    /// ```
    pub fn try_with_config(config: Config) -> Result<Self> {
        Self::try_with_config_and_hooks(config, H::default())
    }
}

impl<K, V, H: HashHooks> RcuMap<K, V, H> {
    /// Creates a new instance of the `RcuMap`, with the default configuration.
    ///
    /// No memory is allocated until the first insertion.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::{DefaultHashHooks, RcuMap};
    /// let map: RcuMap<i32, i32> = RcuMap::with_hooks(DefaultHashHooks::default());
    ///
    /// assert_eq!(0, map.capacity());
    /// ```
    pub fn with_hooks(hooks: H) -> Self {
        Self::try_with_config_and_hooks(Config::default(), hooks)
            .unwrap_or_else(|failure| panic_from_failure(failure))
    }

    /// Creates a new instance of the `RcuMap`, with the given configuration.
    ///
    /// No memory is allocated until the first insertion.
    ///
    /// #   Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid.
    pub fn try_with_config_and_hooks(config: Config, hooks: H) -> Result<Self> {
        config.validate()?;

        let initial = config.initial()?;
        let growth_log2 = config.growth_log2()?;

        Ok(Self {
            hooks,
            config,
            initial,
            growth_log2,
            root: AcqRelPtr::default(),
            generation: GenerationCounter::new(),
            registry: ReaderRegistry::new(config.reader_slots),
            len: RelaxedUsize::new(0),
            capacity: RelaxedUsize::new(0),
            writer: Mutex::new(WriterState::default()),
            _marker: marker::PhantomData,
        })
    }
}

impl<K, V, H: HashHooks> RcuMap<K, V, H> {
    /// Registers a reader, if a reader slot is free.
    ///
    /// #   Errors
    ///
    /// Returns `OutOfReaderSlots` if as many readers as configured are active.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::config::Config;
    /// #   use rcumap::failure::Failure;
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<i32, i32> = RcuMap::with_config(Config::default().with_reader_slots(1));
    ///
    /// let guard = map.try_lock_for_read().unwrap();
    /// assert_eq!(Some(Failure::OutOfReaderSlots), map.try_lock_for_read().err());
    ///
    /// drop(guard);
    /// assert!(map.try_lock_for_read().is_ok());
    /// ```
    pub fn try_lock_for_read(&self) -> Result<ReadGuard<'_, K, V, H>> {
        let handle = self.registry.begin_read(&self.generation)
            .ok_or(Failure::OutOfReaderSlots)?;

        Ok(ReadGuard::new(&self.root, &self.hooks, handle))
    }

    /// Registers a reader, waiting for a reader slot to free up if necessary.
    ///
    /// Waiting is only ever necessary if as many readers as configured are
    /// active; it spins for a short while, then yields.
    ///
    /// Nothing retired while the guard is alive is freed before it is dropped:
    /// a guard held indefinitely, or leaked with `mem::forget`, blocks memory
    /// reclamation for good.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert("key", "value");
    ///
    /// let guard = map.lock_for_read();
    /// assert_eq!(Some(&"value"), guard.get("key"));
    /// ```
    pub fn lock_for_read(&self) -> ReadGuard<'_, K, V, H> {
        let backoff = Backoff::new();
        let mut reported = false;

        loop {
            if let Some(handle) = self.registry.begin_read(&self.generation) {
                return ReadGuard::new(&self.root, &self.hooks, handle);
            }

            if !reported && tracing::enabled!(Level::DEBUG) {
                debug!(slots = self.registry.capacity(), "reader registry saturated, backing off");
                reported = true;
            }

            backoff.snooze();
        }
    }

    /// Returns whether the instance contains any element, or not.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// assert!(map.is_empty());
    ///
    /// map.insert(1, 1);
    /// assert!(!map.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the number of elements contained in the instance, as of the
    /// last completed write.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// assert_eq!(0, map.len());
    ///
    /// map.insert(1, 2);
    /// assert_eq!(1, map.len());
    /// ```
    pub fn len(&self) -> usize { self.len.load() }

    /// Returns the number of slots of the current table, 0 if none was
    /// allocated yet.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// assert_eq!(0, map.capacity());
    ///
    /// //  With the default load factor of 0.5, 9 elements overflow 16 slots.
    /// map.extend((0..9).map(|i| (i, i)));
    /// assert_eq!(32, map.capacity());
    /// ```
    pub fn capacity(&self) -> usize { self.capacity.load() }

    /// Returns the current generation: the number of writes completed.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, 1);
    /// map.insert(1, 2);
    ///
    /// assert_eq!(2, map.generation());
    /// ```
    pub fn generation(&self) -> u64 { self.generation.current().0 }

    /// Returns the minimum generation across active readers, or the current
    /// generation if there is none.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, 1);
    ///
    /// let guard = map.lock_for_read();
    /// map.insert(2, 2);
    ///
    /// assert_eq!(1, map.min_active_generation());
    ///
    /// drop(guard);
    /// assert_eq!(2, map.min_active_generation());
    /// ```
    pub fn min_active_generation(&self) -> u64 {
        self.registry.min_active(self.generation.current()).0
    }

    /// Returns the number of active readers.
    pub fn active_readers(&self) -> usize { self.registry.active() }

    /// Returns the number of retired entries awaiting collection.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, 1);
    ///
    /// let guard = map.lock_for_read();
    /// map.insert(1, 2);
    ///
    /// //  The former value of 1 may still be observed by `guard`.
    /// assert_eq!(1, map.retired_len());
    ///
    /// drop(guard);
    /// assert_eq!(1, map.collect());
    /// assert_eq!(0, map.retired_len());
    /// ```
    pub fn retired_len(&self) -> usize { self.writer.lock().retired.len() }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, false);
    ///
    /// assert!(map.contains_key(&1));
    /// assert!(!map.contains_key(&0));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        self.lock_for_read().contains_key(key)
    }

    /// Returns a copy of the value corresponding to the key, if any.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert("route", String::from("10.0.0.1"));
    ///
    /// assert_eq!(Some(String::from("10.0.0.1")), map.get_cloned("route"));
    /// assert_eq!(None, map.get_cloned("other"));
    /// ```
    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
        V: Clone,
    {
        self.lock_for_read().get(key).cloned()
    }

    /// Inserts a key-value pair into the map, or replaces the value of an
    /// existing key.
    ///
    /// The former value, if any, is retired: it remains readable by any reader
    /// which may have observed it, and is dropped once no reader can.
    ///
    /// #   Errors
    ///
    /// Returns an error if memory cannot be allocated, or if the capacity
    /// cannot grow any further. The map is then left unmodified.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::{Insertion, RcuMap};
    /// let map: RcuMap<_, _> = RcuMap::new();
    ///
    /// assert_eq!(Ok(Insertion::Inserted), map.try_insert(3, false));
    /// assert_eq!(Ok(Insertion::Updated), map.try_insert(3, true));
    ///
    /// assert_eq!(Some(true), map.get_cloned(&3));
    /// ```
    pub fn try_insert(&self, key: K, value: V) -> Result<Insertion>
    where
        K: Eq + hash::Hash,
    {
        let mut writer = self.writer.lock();

        //  A resize, then an update, each retire one entry.
        writer.retired.try_reserve(2)?;

        let hash = Hash::of(&key, &self.hooks);
        let record = boxed::allocate(Record { key, value }, &self.hooks)?;

        //  Safety:
        //  -   Single writer, as `writer` is locked.
        //  -   `record` was allocated with `self.hooks`.
        let result = unsafe { self.insert_record(&mut writer, record, hash) };

        if result.is_err() {
            //  Safety:
            //  -   `record` was not published.
            unsafe { boxed::release(record, &self.hooks) };
        }

        result
    }

    /// Inserts a key-value pair into the map, or replaces the value of an
    /// existing key.
    ///
    /// Calling this method is equivalent to calling `try_insert` and panicking
    /// on error.
    ///
    /// #   Panics
    ///
    /// Panics if the key-value pair cannot be inserted.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::{Insertion, RcuMap};
    /// let map: RcuMap<_, _> = RcuMap::new();
    ///
    /// assert_eq!(Insertion::Inserted, map.insert(3, false));
    /// assert_eq!(Insertion::Updated, map.insert(3, true));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Insertion
    where
        K: Eq + hash::Hash,
    {
        match self.try_insert(key, value) {
            Ok(insertion) => insertion,
            Err(failure) => panic_from_failure(failure),
        }
    }

    /// Removes a key from the map, returns whether it was present.
    ///
    /// The removed value is retired, just as a replaced value is. Removing an
    /// absent key does not count as a write.
    ///
    /// #   Errors
    ///
    /// Returns `OutOfMemory` if the removed value cannot be retired, in which
    /// case the map is left unmodified.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, "one");
    ///
    /// assert_eq!(Ok(true), map.try_remove(&1));
    /// assert_eq!(Ok(false), map.try_remove(&1));
    ///
    /// assert_eq!(2, map.generation());
    /// ```
    pub fn try_remove<Q>(&self, key: &Q) -> Result<bool>
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        let mut writer = self.writer.lock();

        let table = match NonNull::new(self.root.load()) {
            Some(table) => table,
            None => return Ok(false),
        };

        //  Safety:
        //  -   The writer never reclaims the current table.
        let table = unsafe { table.as_ref() };
        let hash = Hash::of(key, &self.hooks);

        //  Safety:
        //  -   Single writer, as `writer` is locked.
        let index = match unsafe { table.probe(key, hash) } {
            Probe::Found(index) => index,
            _ => return Ok(false),
        };

        writer.retired.try_reserve(1)?;

        //  Safety:
        //  -   Single writer, as `writer` is locked.
        //  -   `index` was just probed.
        let record = unsafe { table.bury(index) };

        writer.retired.retire_record(record, self.generation.current());
        writer.live -= 1;

        //  Safety:
        //  -   Single writer, as `writer` is locked.
        unsafe { self.publish(&mut writer) };

        Ok(true)
    }

    /// Removes a key from the map, returns whether it was present.
    ///
    /// Calling this method is equivalent to calling `try_remove` and panicking
    /// on error.
    ///
    /// #   Panics
    ///
    /// Panics if the removed value cannot be retired.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.insert(1, "one");
    ///
    /// assert!(map.remove(&1));
    /// assert!(!map.contains_key(&1));
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: borrow::Borrow<Q>,
        Q: ?Sized + Eq + hash::Hash,
    {
        self.try_remove(key).unwrap_or_else(|failure| panic_from_failure(failure))
    }

    /// Inserts multiple key-value pairs in the map.
    ///
    /// Each pair is a write of its own, hence readers may observe the pairs
    /// inserted so far.
    ///
    /// #   Errors
    ///
    /// Returns the first error encountered, leaving the pairs inserted until
    /// then in the map.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// assert_eq!(Ok(()), map.try_extend([(1, 1), (2, 2), (3, 3)]));
    /// assert_eq!(3, map.len());
    /// ```
    pub fn try_extend<C>(&self, collection: C) -> Result<()>
    where
        C: IntoIterator<Item = (K, V)>,
        K: Eq + hash::Hash,
    {
        for (key, value) in collection {
            self.try_insert(key, value)?;
        }

        Ok(())
    }

    /// Inserts multiple key-value pairs in the map.
    ///
    /// Calling this method is equivalent to calling `try_extend` and panicking
    /// on error.
    ///
    /// #   Panics
    ///
    /// Panics if any of the key-value pairs cannot be inserted.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let map: RcuMap<_, _> = RcuMap::new();
    /// map.extend([(1, 1), (2, 2), (3, 3)]);
    /// assert_eq!(3, map.len());
    /// ```
    pub fn extend<C>(&self, collection: C)
    where
        C: IntoIterator<Item = (K, V)>,
        K: Eq + hash::Hash,
    {
        if let Err(failure) = self.try_extend(collection) {
            panic_from_failure(failure);
        }
    }

    /// Releases every retired entry which no active reader may observe any
    /// longer, returns the number of entries released.
    ///
    /// Depending on the collect policy, collection also happens as part of
    /// writes.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::config::{CollectPolicy, Config};
    /// #   use rcumap::map::RcuMap;
    /// let config = Config::default().with_collect_policy(CollectPolicy::Manual);
    /// let map: RcuMap<_, _> = RcuMap::with_config(config);
    ///
    /// map.insert(1, 1);
    /// map.insert(1, 2);
    /// map.insert(1, 3);
    ///
    /// assert_eq!(2, map.collect());
    /// assert_eq!(0, map.collect());
    /// ```
    pub fn collect(&self) -> usize {
        let mut writer = self.writer.lock();

        self.collect_locked(&mut writer)
    }

    /// Clears the instance.
    ///
    /// Every record and every retired entry is dropped immediately, as no
    /// reader may exist. The instance retains its current table.
    ///
    /// #   Example
    ///
    /// ```
    /// #   use rcumap::map::RcuMap;
    /// let mut map: RcuMap<_, _> = RcuMap::new();
    /// map.extend([(1, false), (2, true), (3, false)]);
    ///
    /// map.clear();
    /// assert_eq!(0, map.len());
    /// assert_eq!(16, map.capacity());
    /// assert_eq!(4, map.generation());
    /// ```
    pub fn clear(&mut self) {
        debug_assert!(self.registry.is_empty());

        let writer = self.writer.get_mut();
        let occupied = writer.occupied;

        //  Reset first, in case a Drop panics.
        writer.live = 0;
        writer.occupied = 0;
        writer.writes_since_collect = 0;
        self.len.store(0);

        //  Safety:
        //  -   No reader, as `self` is borrowed mutably.
        unsafe { writer.retired.release_all(&self.hooks) };

        if let Some(table) = NonNull::new(self.root.load()) {
            //  Safety:
            //  -   The current table is never reclaimed while current.
            let table = unsafe { table.as_ref() };

            for index in 0..table.capacity().get() {
                //  Safety:
                //  -   Exclusive access, as `self` is borrowed mutably.
                if let Some(record) = unsafe { table.vacate(SlotIndex(index)) } {
                    //  Safety:
                    //  -   Unreachable, and allocated with `self.hooks`.
                    unsafe { boxed::release(record, &self.hooks) };
                }
            }
        }

        if occupied > 0 {
            //  Safety:
            //  -   Single writer, as `self` is borrowed mutably.
            unsafe { self.generation.publish_increment() };
        }
    }

    //  Inserts `record`, resizing beforehand if need be.
    //
    //  On error, nothing is published, and `record` is still owned by the
    //  caller.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer, that is `writer` is locked.
    //  -   Assumes that `record` was allocated with `self.hooks`, and that
    //      `hash` is the hash of its key.
    unsafe fn insert_record(
        &self,
        writer: &mut WriterState<Record<K, V>>,
        record: NonNull<Record<K, V>>,
        hash: Hash,
    )
        -> Result<Insertion>
    where
        K: Eq + hash::Hash,
    {
        let key = &record.as_ref().key;

        let mut table = match NonNull::new(self.root.load()) {
            Some(table) => table,
            None => self.allocate_root()?,
        };

        let mut probe = table.as_ref().probe(key, hash);

        if self.needs_resize(writer, table.as_ref(), probe) {
            table = self.resize(writer, table)?;
            probe = table.as_ref().probe(key, hash);
        }

        let table = table.as_ref();

        let insertion = match probe {
            Probe::Found(index) => {
                let previous = table.replace(index, record);
                writer.retired.retire_record(previous, self.generation.current());
                Insertion::Updated
            },
            Probe::Vacant { index, tombstone } => {
                table.place(index, record);
                writer.live += 1;
                if !tombstone {
                    writer.occupied += 1;
                }
                Insertion::Inserted
            },
            Probe::Full => {
                //  Safety:
                //  -   A freshly resized table always has room.
                debug_assert!(false, "No room after resize in {:?}", table.capacity());
                hint::unreachable_unchecked()
            },
        };

        self.publish(writer);

        Ok(insertion)
    }

    //  Allocates the first table, large enough for at least one record.
    //
    //  The table is empty, hence storing it as root publishes nothing.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer.
    unsafe fn allocate_root(&self) -> Result<NonNull<Table<Record<K, V>>>> {
        debug_assert!(self.root.load().is_null());

        let capacity = self.sized_for(self.initial, 1)?;
        let table = Table::allocate(capacity, &self.hooks)?;

        self.root.store(table.as_ptr());
        self.capacity.store(capacity.get());

        Ok(table)
    }

    //  Returns whether inserting at `probe` requires resizing first.
    fn needs_resize(&self, writer: &WriterState<Record<K, V>>, table: &Table<Record<K, V>>, probe: Probe) -> bool {
        match probe {
            Probe::Found(_) | Probe::Vacant { tombstone: true, .. } => false,
            Probe::Vacant { tombstone: false, .. } =>
                writer.occupied + 1 > table.capacity().threshold(self.config.max_load_factor),
            Probe::Full => true,
        }
    }

    //  Replaces `table` by a larger one, or by one of the same capacity if only
    //  tombstones are in the way, and retires it.
    //
    //  The resize is a write of its own, and is published as such.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer, that is `writer` is locked.
    //  -   Assumes that `table` is the current table.
    //  -   Assumes that room for one retired entry is reserved.
    unsafe fn resize(
        &self,
        writer: &mut WriterState<Record<K, V>>,
        table: NonNull<Table<Record<K, V>>>,
    )
        -> Result<NonNull<Table<Record<K, V>>>>
    where
        K: hash::Hash,
    {
        let old = table.as_ref();
        let old_capacity = old.capacity();

        let needed = writer.live + 1;
        let capacity = if old_capacity.threshold(self.config.max_load_factor) >= needed {
            old_capacity
        } else {
            self.sized_for(old_capacity.grow(self.growth_log2)?, needed)?
        };

        let new = Table::allocate(capacity, &self.hooks)?;

        //  Nothing can fail from here on.
        let migrated = old.migrate(new.as_ref(), &self.hooks);
        debug_assert_eq!(writer.live, migrated);

        self.root.store(new.as_ptr());
        self.capacity.store(capacity.get());

        writer.retired.retire_table(table, self.generation.current());
        writer.occupied = writer.live;

        //  The caller collects once its own write is complete, lest a panicking
        //  Drop unwinds past a record not yet placed.
        let generation = self.advance(writer);

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                old_capacity = old_capacity.get(),
                new_capacity = capacity.get(),
                live = writer.live,
                generation = %generation,
                "resized table"
            );
        }

        Ok(new)
    }

    //  Returns `capacity`, grown until it accommodates `needed` records.
    fn sized_for(&self, mut capacity: Capacity, needed: usize) -> Result<Capacity> {
        while capacity.threshold(self.config.max_load_factor) < needed {
            capacity = capacity.grow(self.growth_log2)?;
        }

        Ok(capacity)
    }

    //  Completes a write: publishes the next generation, then collects as per
    //  the collect policy.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer, that is `writer` is locked.
    //  -   Assumes that every entry unlinked by the write has been retired.
    unsafe fn publish(&self, writer: &mut WriterState<Record<K, V>>) -> Generation {
        let generation = self.advance(writer);

        if self.config.collect_policy.should_collect(writer.writes_since_collect, writer.retired.len()) {
            self.collect_locked(writer);
        }

        generation
    }

    //  Publishes the next generation, without collecting.
    //
    //  #   Safety
    //
    //  -   Assumes a single writer, that is `writer` is locked.
    //  -   Assumes that every entry unlinked by the write has been retired.
    unsafe fn advance(&self, writer: &mut WriterState<Record<K, V>>) -> Generation {
        let generation = self.generation.publish_increment();

        self.len.store(writer.live);
        writer.writes_since_collect += 1;

        generation
    }

    //  Releases every retired entry no active reader may observe.
    fn collect_locked(&self, writer: &mut WriterState<Record<K, V>>) -> usize {
        writer.writes_since_collect = 0;

        if writer.retired.is_empty() {
            return 0;
        }

        let min_active = self.registry.min_active(self.generation.current());

        //  Safety:
        //  -   `min_active` is no greater than the generation of any reader.
        //  -   Every entry was allocated with `self.hooks`.
        let released = unsafe { writer.retired.collect(min_active, &self.hooks) };

        if tracing::enabled!(Level::TRACE) {
            trace!(
                released,
                pending = writer.retired.len(),
                min_active = %min_active,
                "collected retired entries"
            );
        }

        released
    }
}

/// An `RcuMap<K, V>` can be `Send` across threads whenever its keys, values and
/// hooks can be shared across threads.
///
/// #   Example of Send.
///
/// ```
/// # use rcumap::map::RcuMap;
/// fn ensure_send<T: Send>(_: T) {}
///
/// let map: RcuMap<_, _> = RcuMap::new();
/// map.insert("Hello", "World");
///
/// ensure_send(map);
/// ```
///
/// #   Example of Key not being Send.
///
/// ```compile_fail
/// # use std::rc::Rc;
/// # use rcumap::map::RcuMap;
/// fn ensure_send<T: Send>(_: T) {}
///
/// let map: RcuMap<_, _> = RcuMap::new();
/// map.insert(Rc::new(3), "World");
///
/// ensure_send(map);
/// ```
unsafe impl<K, V, H> Send for RcuMap<K, V, H>
where
    K: Send + Sync,
    V: Send + Sync,
    H: HashHooks + Send + Sync,
{}

/// An `RcuMap<K, V>` can be shared across threads whenever its keys, values
/// and hooks can: readers share the records, while the writer may drop them
/// on any thread.
///
/// #   Example of Sync.
///
/// ```
/// # use rcumap::map::RcuMap;
/// fn ensure_sync<T: Sync>(_: &T) {}
///
/// let map: RcuMap<_, _> = RcuMap::new();
/// map.insert(1, 2);
///
/// ensure_sync(&map);
/// ```
///
/// #   Example of Value not being Sync.
///
/// ```compile_fail
/// # use std::cell::Cell;
/// # use rcumap::map::RcuMap;
/// fn ensure_sync<T: Sync>(_: &T) {}
///
/// let map: RcuMap<_, _> = RcuMap::new();
/// map.insert(1, Cell::new(2));
///
/// ensure_sync(&map);
/// ```
unsafe impl<K, V, H> Sync for RcuMap<K, V, H>
where
    K: Send + Sync,
    V: Send + Sync,
    H: HashHooks + Send + Sync,
{}

impl<K, V, H: HashHooks> Drop for RcuMap<K, V, H> {
    fn drop(&mut self) {
        debug_assert!(self.registry.is_empty(), "Reader still active on drop");

        let writer = self.writer.get_mut();

        //  Safety:
        //  -   No reader, as `self` is borrowed mutably.
        unsafe { writer.retired.release_all(&self.hooks) };

        let root = self.root.load();
        self.root.store(ptr::null_mut());

        if let Some(table) = NonNull::new(root) {
            //  Safety:
            //  -   No reader, as `self` is borrowed mutably.
            //  -   Allocated with `self.hooks`.
            unsafe { Table::release(table, &self.hooks) };
        }
    }
}

impl<K, V, H: HashHooks + Default> Default for RcuMap<K, V, H> {
    fn default() -> Self { Self::new() }
}

impl<K: fmt::Debug, V: fmt::Debug, H: HashHooks> fmt::Debug for RcuMap<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let guard = self.lock_for_read();

        f.debug_struct("RcuMap")
            .field("generation", &guard.generation())
            .field("capacity", &guard.capacity())
            .field("length", &self.len())
            .field("entries", &guard)
            .finish()
    }
}

impl<K, V, H> iter::FromIterator<(K, V)> for RcuMap<K, V, H>
where
    K: Eq + hash::Hash,
    H: HashHooks + Default,
{
    fn from_iter<C>(collection: C) -> Self
    where
        C: IntoIterator<Item = (K, V)>
    {
        let result: RcuMap<_, _, _> = RcuMap::with_hooks(H::default());
        result.extend(collection);
        result
    }
}

impl<K, V, H> iter::Extend<(K, V)> for RcuMap<K, V, H>
where
    K: Eq + hash::Hash,
    H: HashHooks,
{
    fn extend<C>(&mut self, collection: C)
    where
        C: IntoIterator<Item = (K, V)>
    {
        RcuMap::extend(&*self, collection);
    }
}

//
//  Implementation Details
//

//  State of the writer, only ever accessed with the writer lock held.
struct WriterState<T> {
    retired: RetiredSet<T>,
    //  Number of records in the current table.
    live: usize,
    //  Number of records and tombstones in the current table.
    occupied: usize,
    writes_since_collect: usize,
}

impl<T> Default for WriterState<T> {
    fn default() -> Self {
        Self { retired: RetiredSet::new(), live: 0, occupied: 0, writes_since_collect: 0 }
    }
}
