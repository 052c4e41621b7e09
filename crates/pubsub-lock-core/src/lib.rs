//! Core protocol for a distributed lock held in a key-value store.
//!
//! A [`PubSubLock`] claims a resource with an atomic set-if-absent on a
//! backend key, waits for release notifications on a pub/sub channel
//! between failed claims, and publishes one when it releases. Backends
//! implement [`KeyValueBackend`]; [`InMemoryBackend`] is provided here.

pub mod error;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod prelude;
pub mod traits;
pub mod wait;

pub use error::{LockError, LockResult};
pub use prelude::*;
