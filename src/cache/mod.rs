//! Memoizing function cache
//!
//! Every expensive computation (graph construction, traces, spatial
//! filtering, metric queries) is wrapped by [`CacheClient`], which stores
//! serialized results in a [`CacheStore`] under a hashed [`CacheKey`].
//!
//! # Contract
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Caching disabled | Compute every call, nothing read or written |
//! | Unexpired entry | Return stored bytes, do not compute |
//! | Miss or expired | Compute fully, store with TTL, return |
//! | Computation fails | Error propagates; nothing stored |
//! | Store unreachable | Compute every call, log the transition once |
//!
//! The response variant stores failures as a `FAILURE` envelope with zero
//! TTL instead of propagating them.

pub mod client;
pub mod key;
pub mod response;
pub mod store;

pub use client::{CacheClient, CacheStatus, CacheSwitch};
pub use key::CacheKey;
pub use response::{CachedResponse, ProcessType, ResponseStatus};
pub use store::{create_store, CacheStore, FileStore, MemoryStore, NullStore};
