//! In-process key-value backend.
//!
//! Implements [`KeyValueBackend`] over a mutex-protected map with lazy TTL
//! expiry and synchronous pub/sub delivery. Locks sharing one
//! `InMemoryBackend` behave like processes sharing one store, which makes it
//! suitable for tests, benchmarks and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LockError, LockResult};
use crate::traits::{KeyValueBackend, MessageCallback, Subscription};

struct Entry {
    value: String,
    /// `None` when the TTL is too large to represent: the entry never expires.
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Entry>,
    channels: HashMap<String, Vec<(u64, Arc<MessageCallback>)>>,
}

impl Store {
    fn live_entry(&self, key: &str) -> Option<&Entry> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at.is_none_or(|at| at > Instant::now()))
    }
}

fn lock_store(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key-value backend living entirely in process memory.
#[derive(Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
    next_subscriber: AtomicU64,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<String> {
        lock_store(&self.store)
            .live_entry(key)
            .map(|entry| entry.value.clone())
    }

    /// Returns `true` if `key` is present and not expired.
    pub fn contains_key(&self, key: &str) -> bool {
        lock_store(&self.store).live_entry(key).is_some()
    }

    /// Number of active subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock_store(&self.store)
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl KeyValueBackend for InMemoryBackend {
    const NAME: &'static str = "memory";

    type Subscription = InMemorySubscription;

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        if ttl.is_zero() {
            return Err(LockError::Backend(Box::new(std::io::Error::other(
                "invalid expire time: ttl must be positive",
            ))));
        }

        let mut store = lock_store(&self.store);
        if store.live_entry(key).is_some() {
            return Ok(false);
        }

        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> LockResult<()> {
        lock_store(&self.store).entries.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> LockResult<()> {
        // Callbacks run outside the store lock so they may call back in.
        let callbacks: Vec<Arc<MessageCallback>> = lock_store(&self.store)
            .channels
            .get(channel)
            .map(|subscribers| subscribers.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(payload);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        on_message: MessageCallback,
    ) -> LockResult<Self::Subscription> {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock_store(&self.store)
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(on_message)));

        Ok(InMemorySubscription {
            store: self.store.clone(),
            channel: channel.to_string(),
            id,
        })
    }
}

/// Subscription on an [`InMemoryBackend`] channel. Removed on drop.
pub struct InMemorySubscription {
    store: Arc<Mutex<Store>>,
    channel: String,
    id: u64,
}

impl Subscription for InMemorySubscription {
    async fn unsubscribe(self) -> LockResult<()> {
        drop(self);
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        let mut store = lock_store(&self.store);
        if let Some(subscribers) = store.channels.get_mut(&self.channel) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                store.channels.remove(&self.channel);
            }
        }
    }
}
