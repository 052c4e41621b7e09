//! Redis backend for pubsub-lock.
//!
//! Claims are `SET key holder NX PX timeout`, releases are `DEL` followed by
//! `PUBLISH`, and waiters `SUBSCRIBE` to the release channel on a dedicated
//! connection.

pub mod backend;
pub mod provider;

pub use backend::{RedisBackend, RedisSubscription};
pub use provider::{RedisLock, RedisLockProvider, RedisLockProviderBuilder};
