//! Distributed lock composed of a process-local guard and a backend claim.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::Instant;
use tracing::field::Empty;
use tracing::{Span, instrument, warn};

use crate::error::{LockError, LockResult};
use crate::keys::LockKeys;
use crate::traits::KeyValueBackend;
use crate::wait;

/// A distributed mutual exclusion lock on one named resource.
///
/// The lock's authority is a claim key in the backend, written with
/// set-if-absent and a TTL equal to `timeout`. Between failed claims the lock
/// waits on the resource's release channel for at most `timeout`, then
/// tries again, so a lost notification costs at most one timeout.
///
/// Within one process, `acquire`, `lock_interruptibly` and `try_lock_for`
/// are serialized by a local guard that stays held until `release`.
/// `try_lock` is a single claim attempt and does not take the local guard.
///
/// # Non-guarantees
///
/// * The claim is never renewed. A critical section that outlives `timeout`
///   loses the claim silently and another process may acquire it.
/// * `release` does not verify ownership. Only release what you acquired.
///
/// # Example
///
/// ```rust,ignore
/// let lock = PubSubLock::new(backend, "checkout-42", Duration::from_secs(5))?;
/// lock.acquire().await?;
/// // Critical section
/// lock.release().await?;
/// ```
pub struct PubSubLock<B> {
    backend: Arc<B>,
    keys: LockKeys,
    timeout: Duration,
    /// Value written to the claim key. Diagnostic only, never checked.
    holder_id: String,
    local: Arc<tokio::sync::Mutex<()>>,
    /// Local guard parked between a successful acquire and release.
    local_guard: Mutex<Option<OwnedMutexGuard<()>>>,
}

impl<B: KeyValueBackend> PubSubLock<B> {
    /// Creates a lock on `name` backed by `backend`.
    ///
    /// `timeout` is both the TTL of the claim key and the longest single
    /// wait for a release notification.
    ///
    /// # Errors
    ///
    /// * `LockError::InvalidName` if `name` is empty
    /// * `LockError::InvalidConfig` if `timeout` is zero
    pub fn new(backend: Arc<B>, name: impl Into<String>, timeout: Duration) -> LockResult<Self> {
        let keys = LockKeys::new(name)?;
        if timeout.is_zero() {
            return Err(LockError::InvalidConfig(
                "lock timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            backend,
            keys,
            timeout,
            holder_id: create_holder_id(),
            local: Arc::new(tokio::sync::Mutex::new(())),
            local_guard: Mutex::new(None),
        })
    }

    /// Gets the resource name.
    pub fn name(&self) -> &str {
        self.keys.name()
    }

    /// Gets the claim key and release channel.
    pub fn keys(&self) -> &LockKeys {
        &self.keys
    }

    /// Gets the value this lock writes to the claim key.
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Gets the claim TTL and per-cycle wait bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquires the lock, waiting as long as it takes.
    ///
    /// Dropping the returned future abandons the attempt: the local guard is
    /// released and no claim is left behind, since the claim is only ever
    /// written by a successful atomic round trip.
    ///
    /// # Errors
    ///
    /// Backend failures are returned as-is; the attempt is not retried.
    #[instrument(skip(self), fields(backend = B::NAME, lock.name = %self.name(), lock.key = %self.keys.claim_key(), attempts = Empty, elapsed_ms = Empty))]
    pub async fn acquire(&self) -> LockResult<()> {
        let start = Instant::now();
        let guard = self.local.clone().lock_owned().await;

        self.claim_until(None, None).await?;
        self.park(guard);

        Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Acquires the lock unless `cancel` becomes `true` first.
    ///
    /// Cancellation is observed while waiting for the local guard and while
    /// waiting for a release notification.
    ///
    /// # Errors
    ///
    /// * `LockError::Cancelled` if cancelled before the claim succeeded
    /// * backend failures as for [`acquire`](Self::acquire)
    #[instrument(skip(self, cancel), fields(backend = B::NAME, lock.name = %self.name(), lock.key = %self.keys.claim_key(), attempts = Empty, elapsed_ms = Empty))]
    pub async fn lock_interruptibly(&self, mut cancel: watch::Receiver<bool>) -> LockResult<()> {
        let start = Instant::now();
        let guard = tokio::select! {
            biased;
            _ = wait::cancelled(Some(&mut cancel)) => return Err(LockError::Cancelled),
            guard = self.local.clone().lock_owned() => guard,
        };

        self.claim_until(None, Some(&mut cancel)).await?;
        self.park(guard);

        Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Attempts the claim exactly once.
    ///
    /// Returns `Ok(false)` if the resource is held elsewhere. Does not take
    /// the local guard, so it does not serialize against local callers of
    /// the blocking operations.
    #[instrument(skip(self), fields(backend = B::NAME, lock.name = %self.name(), lock.key = %self.keys.claim_key(), acquired = Empty))]
    pub async fn try_lock(&self) -> LockResult<bool> {
        let acquired = self.try_claim().await?;
        Span::current().record("acquired", acquired);
        Ok(acquired)
    }

    /// Attempts to acquire the lock, retrying for up to `wait`.
    ///
    /// Each retry cycle waits for a release notification bounded by the
    /// smaller of the lock timeout and the time left. A zero `wait` makes a
    /// single attempt. A `wait` too large to represent as a deadline waits
    /// without bound, like [`acquire`](Self::acquire).
    #[instrument(skip(self), fields(backend = B::NAME, lock.name = %self.name(), lock.key = %self.keys.claim_key(), acquired = Empty, attempts = Empty))]
    pub async fn try_lock_for(&self, wait: Duration) -> LockResult<bool> {
        let deadline = Instant::now().checked_add(wait);
        let guard = match deadline {
            Some(deadline) => {
                let Ok(guard) =
                    tokio::time::timeout_at(deadline, self.local.clone().lock_owned()).await
                else {
                    Span::current().record("acquired", false);
                    return Ok(false);
                };
                guard
            }
            None => self.local.clone().lock_owned().await,
        };

        let acquired = self.claim_until(deadline, None).await?;
        if acquired {
            self.park(guard);
        }

        Span::current().record("acquired", acquired);
        Ok(acquired)
    }

    /// Releases the lock: deletes the claim key, then publishes a release
    /// notification.
    ///
    /// Both steps always run, even if this process never held the claim and
    /// even if the delete fails. The local guard is released on every path.
    ///
    /// # Errors
    ///
    /// Returns the delete error if the delete failed, otherwise the publish
    /// error.
    #[instrument(skip(self), fields(backend = B::NAME, lock.name = %self.name(), lock.key = %self.keys.claim_key()))]
    pub async fn release(&self) -> LockResult<()> {
        let guard = self
            .local_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let deleted = self.backend.delete(self.keys.claim_key()).await;
        if let Err(e) = &deleted {
            warn!(error = %e, "failed to delete claim key, publishing release anyway");
        }
        let published = self
            .backend
            .publish(self.keys.release_channel(), self.keys.claim_key())
            .await;

        drop(guard);
        deleted.and(published)
    }

    async fn try_claim(&self) -> LockResult<bool> {
        self.backend
            .set_if_absent(self.keys.claim_key(), &self.holder_id, self.timeout)
            .await
    }

    /// Claims until success, the optional deadline, or cancellation.
    async fn claim_until(
        &self,
        deadline: Option<Instant>,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> LockResult<bool> {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            Span::current().record("attempts", attempts);
            if self.try_claim().await? {
                return Ok(true);
            }

            let wait_for = match deadline {
                None => self.timeout,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                    remaining.min(self.timeout)
                }
            };

            wait::await_release(
                &*self.backend,
                self.keys.release_channel(),
                wait_for,
                cancel.as_deref_mut(),
            )
            .await?;
        }
    }

    fn park(&self, guard: OwnedMutexGuard<()>) {
        *self
            .local_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(guard);
    }
}

/// Generates a holder id of the form `{process_id}_{counter}_{random}`.
fn create_holder_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let random: u64 = rand::thread_rng().r#gen();
    format!("{}_{}_{:016x}", process::id(), counter, random)
}
