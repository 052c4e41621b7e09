//! Redis lock provider implementation.

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::*;
use pubsub_lock_core::error::{LockError, LockResult};
use pubsub_lock_core::lock::PubSubLock;

use crate::backend::RedisBackend;

/// A distributed lock backed by Redis.
pub type RedisLock = PubSubLock<RedisBackend>;

/// Builder for Redis lock provider configuration.
pub struct RedisLockProviderBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
    timeout: Duration,
}

impl RedisLockProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the Redis server URL, e.g. `redis://localhost:6379`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing, connected Redis client for commands.
    ///
    /// Takes precedence over [`url`](Self::url). A separate subscriber
    /// connection is still opened from the client's configuration.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the lock timeout: the claim TTL and the longest single wait
    /// for a release notification.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, connecting to Redis.
    pub async fn build(self) -> LockResult<RedisLockProvider> {
        if self.timeout.is_zero() {
            return Err(LockError::InvalidConfig(
                "lock timeout must be greater than zero".to_string(),
            ));
        }

        let client = match (self.client, self.url) {
            (Some(client), _) => client,
            (None, Some(url)) => {
                let config = RedisConfig::from_url(&url).map_err(|e| {
                    LockError::InvalidConfig(format!("invalid Redis URL: {}", e))
                })?;

                let client = RedisClient::new(config, None, None, None);
                client.connect();
                client.wait_for_connect().await.map_err(|e| {
                    LockError::Connection(Box::new(std::io::Error::other(format!(
                        "failed to connect to Redis: {}",
                        e
                    ))))
                })?;
                client
            }
            (None, None) => {
                return Err(LockError::InvalidConfig(
                    "no Redis client or URL provided".to_string(),
                ));
            }
        };

        Ok(RedisLockProvider {
            backend: Arc::new(RedisBackend::connect(client).await?),
            timeout: self.timeout,
        })
    }
}

impl Default for RedisLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for Redis-based distributed locks.
///
/// All locks created by one provider share its command and subscriber
/// connections.
pub struct RedisLockProvider {
    backend: Arc<RedisBackend>,
    timeout: Duration,
}

impl RedisLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> RedisLockProviderBuilder {
        RedisLockProviderBuilder::new()
    }

    /// Creates a provider using the specified Redis URL and default timeout.
    pub async fn new(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().url(url).build().await
    }

    /// Creates a lock on the named resource.
    pub fn create_lock(&self, name: &str) -> LockResult<RedisLock> {
        PubSubLock::new(self.backend.clone(), name, self.timeout)
    }

    /// Gets the shared backend.
    pub fn backend(&self) -> &Arc<RedisBackend> {
        &self.backend
    }

    /// Gets the timeout applied to created locks.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_server_is_rejected() {
        let result = RedisLockProvider::builder().build().await;
        assert!(matches!(result, Err(LockError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected() {
        let result = RedisLockProvider::builder()
            .url("redis://localhost:6379")
            .timeout(Duration::ZERO)
            .build()
            .await;
        assert!(matches!(result, Err(LockError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisLockProvider::new("not a url").await;
        assert!(matches!(result, Err(LockError::InvalidConfig(_))));
    }
}
