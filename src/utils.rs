//! Internal utilities.

pub mod atomic;
pub mod boxed;

#[cfg(test)]
pub mod tester;
