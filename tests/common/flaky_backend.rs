//! In-memory backend with fault injection for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use pubsub_lock_core::error::{LockError, LockResult};
use pubsub_lock_core::memory::{InMemoryBackend, InMemorySubscription};
use pubsub_lock_core::traits::{KeyValueBackend, MessageCallback};

/// Wraps an [`InMemoryBackend`] with switches that simulate an unreachable
/// store, lost release notifications, and claims that ignore existing holders.
#[derive(Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    offline: AtomicBool,
    lose_notifications: AtomicBool,
    ignore_existing_claims: AtomicBool,
    publishes: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Every command fails with a connection error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Publishes are counted but never delivered.
    pub fn set_lose_notifications(&self, lose: bool) {
        self.lose_notifications.store(lose, Ordering::SeqCst);
    }

    /// Every claim succeeds, as if the store's conditional set raced.
    pub fn set_ignore_existing_claims(&self, ignore: bool) {
        self.ignore_existing_claims.store(ignore, Ordering::SeqCst);
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> LockResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LockError::Connection(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "backend offline",
            ))));
        }
        Ok(())
    }
}

impl KeyValueBackend for FlakyBackend {
    const NAME: &'static str = "flaky";

    type Subscription = InMemorySubscription;

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.check_online()?;
        if self.ignore_existing_claims.load(Ordering::SeqCst) {
            self.inner.delete(key).await?;
        }
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> LockResult<()> {
        self.check_online()?;
        self.inner.delete(key).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> LockResult<()> {
        self.check_online()?;
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.lose_notifications.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(
        &self,
        channel: &str,
        on_message: MessageCallback,
    ) -> LockResult<Self::Subscription> {
        self.check_online()?;
        self.inner.subscribe(channel, on_message).await
    }
}
