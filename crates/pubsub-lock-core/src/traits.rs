//! Backend traits the lock protocol is written against.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

// ============================================================================
// Key-Value Backend Trait
// ============================================================================

/// Callback invoked with the payload of every message received on a
/// subscribed channel.
pub type MessageCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// External key-value store holding the lock's authority.
///
/// The store is treated as a black box: whatever atomicity its conditional
/// set offers is the lock's only mutual-exclusion guarantee.
///
/// # Example
///
/// ```rust,ignore
/// // Claim "lock_jobs" for 30 seconds unless someone else already holds it.
/// if backend.set_if_absent("lock_jobs", "worker-1", Duration::from_secs(30)).await? {
///     run_jobs().await;
///     backend.delete("lock_jobs").await?;
///     backend.publish("release_lock_jobs", "lock_jobs").await?;
/// }
/// ```
pub trait KeyValueBackend: Send + Sync {
    /// Short backend name recorded on lock spans, e.g. `"redis"`.
    const NAME: &'static str;

    /// Handle to an active channel subscription.
    type Subscription: Subscription;

    /// Atomically sets `key` to `value` with a time-to-live of `ttl`, only if
    /// the key is absent.
    ///
    /// Returns `Ok(true)` if the key was set, `Ok(false)` if it already
    /// existed.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Removes `key` unconditionally. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = LockResult<()>> + Send;

    /// Publishes `payload` on `channel`. Fire-and-forget: no persistence,
    /// no acknowledgement, lost if nobody is subscribed.
    fn publish(&self, channel: &str, payload: &str)
    -> impl Future<Output = LockResult<()>> + Send;

    /// Subscribes to `channel`, invoking `on_message` for every message.
    ///
    /// Once this resolves the subscription is registered with the backend,
    /// so messages published afterwards are delivered.
    fn subscribe(
        &self,
        channel: &str,
        on_message: MessageCallback,
    ) -> impl Future<Output = LockResult<Self::Subscription>> + Send;
}

/// Active subscription returned by [`KeyValueBackend::subscribe`].
///
/// Implementations must also tear the subscription down when dropped
/// without an explicit [`unsubscribe`](Subscription::unsubscribe), so that a
/// cancelled wait never leaks backend-side subscription state.
pub trait Subscription: Send {
    /// Stops delivery and removes the subscription from the backend.
    fn unsubscribe(self) -> impl Future<Output = LockResult<()>> + Send;
}
