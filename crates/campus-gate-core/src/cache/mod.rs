//! Cache actors for campus data domains.

pub mod actor;
pub mod optional;
pub mod store;

pub use actor::CacheActor;
pub use optional::with_optional;
pub use store::{CacheEntry, DiskCache, Persistence};
