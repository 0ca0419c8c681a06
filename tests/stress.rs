//! Stress tests: one writer, many readers.
//!
//! The map allocates through a quarantining allocator which never returns
//! memory before the map itself is gone, and values poison themselves on drop.
//! A reader observing a reclaimed value thus sees the poison, rather than
//! freed memory.
//!
//! Watched values go further, and check as they are dropped that no active
//! reader started at or before their retirement.

use std::collections::hash_map::{DefaultHasher, RandomState};
use std::hash::BuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::thread;
use parking_lot::Mutex;

use rcumap::allocator::{Allocator, DefaultAllocator, Layout};
use rcumap::config::{CollectPolicy, Config};
use rcumap::map::{HashHooks, RcuMap};

const ALIVE: u64 = 0xA11C_E0A1_1CE0_A11C;
const DEAD: u64 = 0xDEAD_DEAD_DEAD_DEAD;
const UNSTAMPED: u64 = u64::MAX;
const IDLE: u64 = u64::MAX;

//  A value which poisons itself on drop.
//
//  A watched value also checks, as it is dropped, that it was retired before
//  any reader currently active started.
struct Canary {
    state: AtomicU64,
    payload: u64,
    retired_at: AtomicU64,
    watch: Option<Arc<Watch>>,
}

impl Canary {
    fn new(payload: u64) -> Self { Self::with_watch(payload, None) }

    fn watched(payload: u64, watch: &Arc<Watch>) -> Self { Self::with_watch(payload, Some(watch.clone())) }

    fn with_watch(payload: u64, watch: Option<Arc<Watch>>) -> Self {
        Canary { state: AtomicU64::new(ALIVE), payload, retired_at: AtomicU64::new(UNSTAMPED), watch }
    }

    //  Returns the payload, after checking the value was not dropped.
    fn payload(&self) -> u64 {
        assert_eq!(ALIVE, self.state.load(Ordering::Relaxed), "use after reclaim of {}", self.payload);
        self.payload
    }
}

impl Drop for Canary {
    fn drop(&mut self) {
        let retired_at = self.retired_at.load(Ordering::Relaxed);

        match &self.watch {
            Some(watch) if retired_at != UNSTAMPED => watch.check_free(retired_at),
            _ => (),
        }

        let previous = self.state.swap(DEAD, Ordering::Relaxed);
        assert_eq!(ALIVE, previous, "double drop of {}", self.payload);
    }
}

//  The generations of the active readers, as they registered them.
struct Watch {
    readers: Vec<AtomicU64>,
    checked: AtomicUsize,
}

impl Watch {
    fn new(readers: usize) -> Arc<Self> {
        let readers = (0..readers).map(|_| AtomicU64::new(IDLE)).collect();
        Arc::new(Watch { readers, checked: AtomicUsize::new(0) })
    }

    //  Checks that a value retired at `tag` may be freed: every active reader
    //  started strictly after its retirement.
    fn check_free(&self, tag: u64) {
        for (index, reader) in self.readers.iter().enumerate() {
            let generation = reader.load(Ordering::SeqCst);

            if generation != IDLE {
                assert!(tag < generation, "freed value retired at {} while reader {} at {}", tag, index, generation);
            }
        }

        self.checked.fetch_add(1, Ordering::Relaxed);
    }
}

//  An allocator which quarantines deallocated memory until dropped.
#[derive(Default)]
struct Quarantine {
    allocator: DefaultAllocator,
    hasher: RandomState,
    live: AtomicUsize,
    quarantined: Mutex<Vec<(usize, Layout)>>,
}

impl Quarantine {
    //  Returns the number of allocations not yet deallocated.
    fn live(&self) -> usize { self.live.load(Ordering::Relaxed) }
}

impl Drop for Quarantine {
    fn drop(&mut self) {
        for (address, layout) in self.quarantined.get_mut().drain(..) {
            unsafe { self.allocator.deallocate(address as *mut u8, layout) };
        }
    }
}

//  Hooks allocating from a `Quarantine`.
#[derive(Clone, Copy)]
struct Hooks<'a>(&'a Quarantine);

impl<'a> Allocator for Hooks<'a> {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        self.0.live.fetch_add(1, Ordering::Relaxed);
        self.0.allocator.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        self.0.live.fetch_sub(1, Ordering::Relaxed);
        self.0.quarantined.lock().push((ptr as usize, layout));
    }
}

impl<'a> BuildHasher for Hooks<'a> {
    type Hasher = DefaultHasher;

    fn build_hasher(&self) -> DefaultHasher { self.0.hasher.build_hasher() }
}

impl<'a> HashHooks for Hooks<'a> {}

type StressMap<'a> = RcuMap<u64, Canary, Hooks<'a>>;

fn stress_map(quarantine: &Quarantine, config: Config) -> StressMap<'_> {
    RcuMap::try_with_config_and_hooks(config, Hooks(quarantine)).unwrap()
}

//  Stamps the value of `key`, if any, with the generation its upcoming
//  retirement is tagged with.
//
//  Only valid before an update or a removal, neither of which resizes.
fn stamp(map: &StressMap<'_>, key: u64) {
    let tag = map.generation();

    if let Some(value) = map.lock_for_read().get(&key) {
        value.retired_at.store(tag, Ordering::Relaxed);
    }
}

const READERS: usize = 6;
const KEYS: u64 = 64;
const ROUNDS: u64 = 200;

#[test]
fn no_use_after_reclaim() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default().with_initial_capacity(2));
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|_| {
                let mut last = vec![0; KEYS as usize];

                while !done.load(Ordering::Acquire) {
                    let guard = map.lock_for_read();
                    let mut held = Vec::new();

                    for key in 0..KEYS {
                        if let Some(value) = guard.get(&key) {
                            let payload = value.payload();

                            //  Successive guards never go back in time.
                            assert!(payload >= last[key as usize], "{} < {}", payload, last[key as usize]);
                            last[key as usize] = payload;

                            held.push(value);
                        }
                    }

                    //  Still alive, whatever the writer did meanwhile.
                    for value in held {
                        value.payload();
                    }
                }
            });
        }

        scope.spawn(|_| {
            for round in 1..=ROUNDS {
                for key in 0..KEYS {
                    map.insert(key, Canary::new(round));
                }

                if round % 10 == 0 {
                    for key in (0..KEYS).step_by(3) {
                        map.remove(&key);
                    }
                }
            }

            done.store(true, Ordering::Release);
        });
    }).unwrap();

    //  The last round removed every third key.
    assert_eq!(KEYS as usize - (KEYS as usize + 2) / 3, map.len());
    assert_eq!(0, map.active_readers());

    map.collect();
    assert_eq!(0, map.retired_len());
}

#[test]
fn freed_after_every_reader() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default().with_initial_capacity(2));
    let watch = Watch::new(READERS);
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for reader in 0..READERS {
            let (map, watch, done) = (&map, &watch, &done);

            scope.spawn(move |_| {
                let slot = &watch.readers[reader];

                while !done.load(Ordering::Acquire) {
                    let guard = map.lock_for_read();
                    slot.store(guard.generation(), Ordering::SeqCst);

                    for key in 0..KEYS {
                        if let Some(value) = guard.get(&key) {
                            value.payload();
                        }
                    }

                    //  Idle strictly before deregistering.
                    slot.store(IDLE, Ordering::SeqCst);
                    drop(guard);
                }
            });
        }

        scope.spawn(|_| {
            for round in 1..=ROUNDS {
                for key in 0..KEYS {
                    stamp(&map, key);
                    map.insert(key, Canary::watched(round, &watch));
                }

                if round % 10 == 0 {
                    for key in (0..KEYS).step_by(3) {
                        stamp(&map, key);
                        map.remove(&key);
                    }
                }
            }

            done.store(true, Ordering::Release);
        });
    }).unwrap();

    map.collect();
    assert_eq!(0, map.retired_len());

    //  Every value retired by an update or a removal has been checked.
    assert!(watch.checked.load(Ordering::Relaxed) > 0);
}

#[test]
fn read_after_write() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default());
    let published = AtomicU64::new(0);

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|_| {
                loop {
                    let latest = published.load(Ordering::Acquire);

                    if latest == 0 {
                        continue;
                    }

                    let guard = map.lock_for_read();
                    let value = guard.get(&latest).map(Canary::payload);

                    assert_eq!(Some(latest), value);

                    if latest == 2_000 {
                        break;
                    }
                }
            });
        }

        scope.spawn(|_| {
            for key in 1..=2_000 {
                map.insert(key, Canary::new(key));
                published.store(key, Ordering::Release);
            }
        });
    }).unwrap();

    assert_eq!(2_000, map.len());
}

#[test]
fn resize_atomicity() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default().with_initial_capacity(2));
    let published = AtomicU64::new(0);

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|_| {
                loop {
                    let latest = published.load(Ordering::Acquire);
                    let guard = map.lock_for_read();

                    //  Every key published before the guard, whichever table
                    //  the guard observes.
                    for key in 1..=latest {
                        assert_eq!(Some(key), guard.get(&key).map(Canary::payload));
                    }

                    if latest == 1_000 {
                        break;
                    }
                }
            });
        }

        scope.spawn(|_| {
            for key in 1..=1_000 {
                map.insert(key, Canary::new(key));
                published.store(key, Ordering::Release);
            }
        });
    }).unwrap();

    assert!(map.capacity() >= 2_048);
}

#[test]
fn monotonic_generation() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default().with_collect_policy(CollectPolicy::EveryNWrites(8)));
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|_| {
                let mut last = 0;

                while !done.load(Ordering::Acquire) {
                    let guard = map.lock_for_read();
                    let generation = guard.generation();

                    assert!(generation >= last, "{} < {}", generation, last);
                    assert!(map.generation() >= generation);
                    assert!(map.min_active_generation() <= map.generation());

                    last = generation;
                }
            });
        }

        scope.spawn(|_| {
            for i in 0..5_000 {
                map.insert(i % 100, Canary::new(i));
            }

            done.store(true, Ordering::Release);
        });
    }).unwrap();

    assert_eq!(100, map.len());
}

#[test]
fn saturated_registry() {
    let quarantine = Quarantine::default();
    let map = stress_map(&quarantine, Config::default().with_reader_slots(2));
    map.extend((0..16).map(|key| (key, Canary::new(key))));

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|_| {
                for _ in 0..1_000 {
                    let guard = map.lock_for_read();
                    assert_eq!(Some(7), guard.get(&7).map(Canary::payload));
                }
            });
        }

        scope.spawn(|_| {
            for i in 0..1_000 {
                map.insert(i % 16 + 100, Canary::new(i));
            }
        });
    }).unwrap();

    assert_eq!(0, map.active_readers());
}

#[test]
fn everything_released() {
    let quarantine = Quarantine::default();

    {
        let map = stress_map(&quarantine, Config::default().with_collect_policy(CollectPolicy::Manual));

        for i in 0..500 {
            map.insert(i % 50, Canary::new(i));
        }

        assert!(map.retired_len() > 0);
        assert!(quarantine.live() > 50);
    }

    assert_eq!(0, quarantine.live());
}
