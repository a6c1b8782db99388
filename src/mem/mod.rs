//! Fixed-capacity memory pools.
//!
//! Every structure the cache links together lives in a [`Pool`] sized once
//! at startup, so the resolver never allocates after init.

pub mod pool;

pub use pool::{BlockId, Pool, PoolStats};
