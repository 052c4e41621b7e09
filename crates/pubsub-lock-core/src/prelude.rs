//! Convenience prelude for lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::keys::LockKeys;
pub use crate::lock::PubSubLock;
pub use crate::memory::InMemoryBackend;
pub use crate::traits::{KeyValueBackend, MessageCallback, Subscription};
