//! Configuration of a map.
//!
//! A `Config` is a plain value, built with the `with_*` methods and checked
//! once, when the map is constructed.
//!
//! ```
//! use rcumap::config::{CollectPolicy, Config};
//!
//! let config = Config::default()
//!     .with_initial_capacity(64)
//!     .with_max_load_factor(0.75)
//!     .with_collect_policy(CollectPolicy::EveryNWrites(16));
//!
//! assert_eq!(Ok(()), config.validate());
//! ```

use crate::failure::{Failure, Result};
use crate::table::capacity::{self, Capacity};

/// When the writer sweeps the Retired Set.
///
/// Collection only bounds memory growth; it never affects what readers see.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CollectPolicy {
    /// After every completed write.
    #[default]
    EveryWrite,
    /// After every `n` completed writes, `n >= 1`.
    EveryNWrites(usize),
    /// After a completed write, if the Retired Set holds at least `n` entries,
    /// `n >= 1`.
    RetiredThreshold(usize),
    /// Only when `collect` is called.
    Manual,
}

impl CollectPolicy {
    //  Returns whether to collect, given the number of writes since the last
    //  collection and the number of retired entries.
    pub(crate) fn should_collect(self, writes: usize, retired: usize) -> bool {
        match self {
            CollectPolicy::EveryWrite => true,
            CollectPolicy::EveryNWrites(n) => writes >= n,
            CollectPolicy::RetiredThreshold(n) => retired >= n,
            CollectPolicy::Manual => false,
        }
    }
}

/// Construction parameters of a map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Number of slots of the first table, rounded up to a power of 2, and at
    /// least 2.
    pub initial_capacity: usize,
    /// Maximum ratio of occupied slots to capacity, in `(0, 1)`.
    pub max_load_factor: f64,
    /// Factor by which the capacity is multiplied on resize, a power of 2 no
    /// less than 2.
    pub growth_factor: usize,
    /// When to sweep the Retired Set.
    pub collect_policy: CollectPolicy,
    /// Maximum number of concurrently active readers.
    pub reader_slots: usize,
}

impl Config {
    /// Sets the initial capacity.
    pub fn with_initial_capacity(self, initial_capacity: usize) -> Self {
        Self { initial_capacity, ..self }
    }

    /// Sets the maximum load factor.
    pub fn with_max_load_factor(self, max_load_factor: f64) -> Self {
        Self { max_load_factor, ..self }
    }

    /// Sets the growth factor.
    pub fn with_growth_factor(self, growth_factor: usize) -> Self {
        Self { growth_factor, ..self }
    }

    /// Sets the collect policy.
    pub fn with_collect_policy(self, collect_policy: CollectPolicy) -> Self {
        Self { collect_policy, ..self }
    }

    /// Sets the number of reader slots.
    pub fn with_reader_slots(self, reader_slots: usize) -> Self {
        Self { reader_slots, ..self }
    }

    /// Checks that every field is within range.
    ///
    /// #   Errors
    ///
    /// Returns `InvalidConfig`, naming the first offending field.
    ///
    /// #   Example
    ///
    /// ```
    /// use rcumap::config::Config;
    /// use rcumap::failure::Failure;
    ///
    /// let config = Config::default().with_growth_factor(3);
    ///
    /// assert_eq!(Err(Failure::InvalidConfig { field: "growth_factor" }), config.validate());
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.initial()?;
        self.growth_log2()?;

        let load = self.max_load_factor;

        if !(load.is_finite() && load > 0.0 && load < 1.0) {
            return Err(Failure::InvalidConfig { field: "max_load_factor" });
        }

        match self.collect_policy {
            CollectPolicy::EveryNWrites(0) | CollectPolicy::RetiredThreshold(0) =>
                return Err(Failure::InvalidConfig { field: "collect_policy" }),
            _ => (),
        }

        if self.reader_slots == 0 {
            return Err(Failure::InvalidConfig { field: "reader_slots" });
        }

        Ok(())
    }

    //  Returns the capacity of the first table.
    pub(crate) fn initial(&self) -> Result<Capacity> {
        Capacity::new(self.initial_capacity)
            .map_err(|_| Failure::InvalidConfig { field: "initial_capacity" })
    }

    //  Returns the log2 of the growth factor.
    pub(crate) fn growth_log2(&self) -> Result<u8> {
        capacity::factor_log2(self.growth_factor)
            .ok_or(Failure::InvalidConfig { field: "growth_factor" })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            max_load_factor: 0.5,
            growth_factor: 2,
            collect_policy: CollectPolicy::EveryWrite,
            reader_slots: 128,
        }
    }
}

#[cfg(test)]
mod tests {

use super::*;

fn invalid(field: &'static str) -> Result<()> { Err(Failure::InvalidConfig { field }) }

#[test]
fn default_is_valid() {
    let config = Config::default();

    assert_eq!(Ok(()), config.validate());
    assert_eq!(16, config.initial().unwrap().get());
    assert_eq!(1, config.growth_log2().unwrap());
}

#[test]
fn initial_capacity_rounded() {
    let config = Config::default().with_initial_capacity(0);
    assert_eq!(2, config.initial().unwrap().get());

    let config = Config::default().with_initial_capacity(17);
    assert_eq!(32, config.initial().unwrap().get());

    let config = Config::default().with_initial_capacity(usize::MAX);
    assert_eq!(invalid("initial_capacity"), config.validate());
}

#[test]
fn max_load_factor_range() {
    for load in [0.0, 1.0, -0.5, 1.5, f64::NAN, f64::INFINITY] {
        let config = Config::default().with_max_load_factor(load);
        assert_eq!(invalid("max_load_factor"), config.validate(), "{}", load);
    }

    for load in [0.1, 0.5, 0.9] {
        let config = Config::default().with_max_load_factor(load);
        assert_eq!(Ok(()), config.validate(), "{}", load);
    }
}

#[test]
fn growth_factor_power_of_two() {
    for factor in [0, 1, 3, 6] {
        let config = Config::default().with_growth_factor(factor);
        assert_eq!(invalid("growth_factor"), config.validate(), "{}", factor);
    }

    let config = Config::default().with_growth_factor(8);
    assert_eq!(3, config.growth_log2().unwrap());
}

#[test]
fn collect_policy_non_zero() {
    let config = Config::default().with_collect_policy(CollectPolicy::EveryNWrites(0));
    assert_eq!(invalid("collect_policy"), config.validate());

    let config = Config::default().with_collect_policy(CollectPolicy::RetiredThreshold(0));
    assert_eq!(invalid("collect_policy"), config.validate());

    let config = Config::default().with_collect_policy(CollectPolicy::Manual);
    assert_eq!(Ok(()), config.validate());
}

#[test]
fn reader_slots_non_zero() {
    let config = Config::default().with_reader_slots(0);
    assert_eq!(invalid("reader_slots"), config.validate());
}

#[test]
fn collect_policy_should_collect() {
    assert!(CollectPolicy::EveryWrite.should_collect(1, 0));

    assert!(!CollectPolicy::EveryNWrites(3).should_collect(2, 10));
    assert!(CollectPolicy::EveryNWrites(3).should_collect(3, 0));

    assert!(!CollectPolicy::RetiredThreshold(4).should_collect(100, 3));
    assert!(CollectPolicy::RetiredThreshold(4).should_collect(1, 4));

    assert!(!CollectPolicy::Manual.should_collect(usize::MAX, usize::MAX));
}

}
