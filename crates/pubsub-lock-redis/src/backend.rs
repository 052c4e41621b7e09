//! Redis implementation of the key-value backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fred::prelude::*;
use pubsub_lock_core::error::{LockError, LockResult};
use pubsub_lock_core::traits::{KeyValueBackend, MessageCallback, Subscription};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Redis backend for [`PubSubLock`](pubsub_lock_core::PubSubLock).
///
/// Commands go through `client`. Subscriptions use a second, dedicated
/// connection so that a connection in subscribe mode is never shared with
/// regular commands. Channels are reference counted: concurrent waiters on
/// the same channel share one `SUBSCRIBE`, and `UNSUBSCRIBE` is only sent
/// when the last of them leaves.
#[derive(Clone)]
pub struct RedisBackend {
    client: RedisClient,
    subscriber: RedisClient,
    channels: Arc<tokio::sync::Mutex<HashMap<String, usize>>>,
}

impl RedisBackend {
    /// Creates a backend from a connected command client.
    ///
    /// A dedicated subscriber connection with the same configuration is
    /// opened before this returns.
    pub async fn connect(client: RedisClient) -> LockResult<Self> {
        let subscriber = client.clone_new();
        subscriber.connect();
        subscriber.wait_for_connect().await.map_err(|e| {
            LockError::Connection(Box::new(std::io::Error::other(format!(
                "failed to connect Redis subscriber: {}",
                e
            ))))
        })?;

        Ok(Self::from_clients(client, subscriber))
    }

    /// Creates a backend from two connected clients.
    ///
    /// `subscriber` must not be used for anything else.
    pub fn from_clients(client: RedisClient, subscriber: RedisClient) -> Self {
        Self {
            client,
            subscriber,
            channels: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Gets the command client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    /// Number of live subscriptions sharing `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.lock().await.get(channel).copied().unwrap_or(0)
    }

    async fn retain_channel(&self, channel: &str) -> LockResult<()> {
        let mut channels = self.channels.lock().await;
        match channels.get_mut(channel) {
            Some(count) => *count += 1,
            None => {
                self.subscriber
                    .subscribe(channel)
                    .await
                    .map_err(map_redis_error("SUBSCRIBE"))?;
                channels.insert(channel.to_string(), 1);
            }
        }
        Ok(())
    }

    async fn release_channel(&self, channel: &str) -> LockResult<()> {
        let mut channels = self.channels.lock().await;
        let Some(count) = channels.get_mut(channel) else {
            return Ok(());
        };

        *count -= 1;
        if *count > 0 {
            return Ok(());
        }

        channels.remove(channel);
        self.subscriber
            .unsubscribe(channel)
            .await
            .map_err(map_redis_error("UNSUBSCRIBE"))
    }
}

impl KeyValueBackend for RedisBackend {
    const NAME: &'static str = "redis";

    type Subscription = RedisSubscription;

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        // SET NX returns Some("OK") if the key was set, None if it already exists
        let result: Option<String> = self
            .client
            .set(
                key,
                value,
                Some(Expiration::PX(ttl_millis(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(map_redis_error("SET NX"))?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> LockResult<()> {
        let _: i64 = self
            .client
            .del(key)
            .await
            .map_err(map_redis_error("DEL"))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> LockResult<()> {
        let receivers: i64 = self
            .client
            .publish(channel, payload)
            .await
            .map_err(map_redis_error("PUBLISH"))?;
        debug!(channel, receivers, "published release notification");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, on_message), fields(backend = "redis"))]
    async fn subscribe(
        &self,
        channel: &str,
        on_message: MessageCallback,
    ) -> LockResult<Self::Subscription> {
        // Receiver is created before SUBSCRIBE so nothing published after
        // the subscription is confirmed can be missed.
        let mut messages = self.subscriber.message_rx();
        self.retain_channel(channel).await?;

        let channel_name = channel.to_string();
        let forward = tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) if &*message.channel == channel_name.as_str() => {
                        let payload = message.value.as_string().unwrap_or_default();
                        on_message(&payload);
                    }
                    Ok(_) => continue,
                    // A skipped message may have been ours; wake the waiter.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "subscriber lagged");
                        on_message("");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(RedisSubscription {
            backend: self.clone(),
            channel: channel.to_string(),
            forward,
            released: false,
        })
    }
}

/// Subscription to a Redis channel.
///
/// Dropping it without calling `unsubscribe` stops delivery immediately and
/// releases the channel in a background task.
pub struct RedisSubscription {
    backend: RedisBackend,
    channel: String,
    forward: JoinHandle<()>,
    released: bool,
}

impl Subscription for RedisSubscription {
    async fn unsubscribe(mut self) -> LockResult<()> {
        self.forward.abort();
        let result = self.backend.release_channel(&self.channel).await;
        self.released = true;
        result
    }
}

impl Drop for RedisSubscription {
    fn drop(&mut self) {
        self.forward.abort();
        if self.released {
            return;
        }

        // Can't await UNSUBSCRIBE in Drop
        let backend = self.backend.clone();
        let channel = std::mem::take(&mut self.channel);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = backend.release_channel(&channel).await {
                    warn!(channel = %channel, error = %e, "failed to release Redis subscription");
                }
            });
        }
    }
}

/// Converts a TTL to whole milliseconds, never rounding a positive TTL to 0.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Maps a fred error to a lock error, separating unreachable-server failures
/// from command failures.
fn map_redis_error(command: &'static str) -> impl Fn(RedisError) -> LockError {
    move |e| {
        let error = Box::new(std::io::Error::other(format!(
            "Redis {} failed: {}",
            command, e
        )));
        match e.kind() {
            RedisErrorKind::IO | RedisErrorKind::Timeout | RedisErrorKind::Canceled => {
                LockError::Connection(error)
            }
            _ => LockError::Backend(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(5)), 5000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(1 << 60)), i64::MAX);
        assert_eq!(ttl_millis(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(RedisBackend::NAME, "redis");
    }

    #[test]
    fn test_io_errors_are_connection_errors() {
        let map = map_redis_error("SET NX");

        let error = map(RedisError::new(RedisErrorKind::IO, "connection reset"));
        assert!(error.is_connection());
        assert!(error.to_string().contains("SET NX"));

        let error = map(RedisError::new(RedisErrorKind::Timeout, "timed out"));
        assert!(error.is_connection());
    }

    #[test]
    fn test_command_errors_are_backend_errors() {
        let map = map_redis_error("SET NX");
        let error = map(RedisError::new(
            RedisErrorKind::InvalidArgument,
            "invalid expire time",
        ));
        assert!(matches!(error, LockError::Backend(_)));
    }
}
