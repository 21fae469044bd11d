//! Concurrency primitives.

pub mod semaphore;

pub use semaphore::{Permit, Semaphore};
