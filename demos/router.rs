//! A simple routing table example.
//!
//! In this example, there are several threads:
//! -   A Control thread intermittently re-routes prefixes, and withdraws a few.
//! -   Several Forwarding threads "model" a continuous stream of packets, and
//!     look up the next hop of each.
//!
//! Forwarding threads never wait on the Control thread: each batch of packets
//! is routed under a single `ReadGuard`, which keeps every next hop it hands
//! out alive until the batch is done.
//!
//! Logs are emitted at the DEBUG level, showing resizes as they happen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time};

use rcumap::config::{CollectPolicy, Config};
use rcumap::map::{HashHooks, RcuMap, ReadGuard};

const NUMBER_PREFIXES: u32 = 64;
const NUMBER_FORWARDERS: usize = 3;
const NUMBER_UPDATES: u32 = 20;
const PACKETS_PER_BATCH: u32 = 1_000;

const PACE_TIME: time::Duration = time::Duration::from_millis(20);

#[derive(Clone, Debug)]
struct NextHop {
    gateway: String,
    metric: u32,
}

//  Mixed-types look-up!
fn route<'g, H: HashHooks>(guard: &'g ReadGuard<'_, String, NextHop, H>, prefix: &str) -> Option<&'g NextHop> {
    guard.get(prefix)
}

fn prefix(i: u32) -> String { format!("10.{}.0.0/16", i % NUMBER_PREFIXES) }

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config = Config::default()
        .with_initial_capacity(8)
        .with_collect_policy(CollectPolicy::EveryNWrites(8));

    let table: RcuMap<String, NextHop> = RcuMap::with_config(config);
    let done = AtomicBool::new(false);

    crossbeam_utils::thread::scope(|scope| {
        //
        //  Forwarders
        //
        for forwarder in 0..NUMBER_FORWARDERS {
            let table = &table;
            let done = &done;

            scope.spawn(move |_| {
                let mut routed = 0u64;
                let mut dropped = 0u64;

                while !done.load(Ordering::Acquire) {
                    let guard = table.lock_for_read();

                    for packet in 0..PACKETS_PER_BATCH {
                        match route(&guard, &prefix(packet)) {
                            Some(hop) if hop.metric < 100 => routed += 1,
                            _ => dropped += 1,
                        }
                    }

                    drop(guard);
                    thread::yield_now();
                }

                println!("Forwarder {} - routed {}, dropped {}", forwarder, routed, dropped);
            });
        }

        //
        //  Control
        //
        scope.spawn(|_| {
            for update in 0..NUMBER_UPDATES {
                for i in 0..NUMBER_PREFIXES {
                    let hop = NextHop { gateway: format!("192.168.{}.1", (i + update) % 4), metric: update };
                    table.insert(prefix(i), hop);
                }

                for i in (0..NUMBER_PREFIXES).step_by(7) {
                    table.remove(prefix(i + update).as_str());
                }

                println!(
                    "Control - update {}, generation {}, {} routes, {} retired",
                    update,
                    table.generation(),
                    table.len(),
                    table.retired_len(),
                );

                thread::sleep(PACE_TIME);
            }

            done.store(true, Ordering::Release);
        });
    }).unwrap();

    println!("Final - {} routes, {} slots, {} freed", table.len(), table.capacity(), table.collect());

    if let Some(hop) = table.get_cloned("10.1.0.0/16") {
        println!("Final - 10.1.0.0/16 via {} (metric {})", hop.gateway, hop.metric);
    }
}
