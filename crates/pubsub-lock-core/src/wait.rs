//! Waiting for a release notification between claim attempts.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, instrument, warn};

use crate::error::{LockError, LockResult};
use crate::traits::{KeyValueBackend, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Notified,
    TimedOut,
    Cancelled,
}

/// Blocks until a message arrives on `channel`, `timeout` elapses, or
/// `cancel` flips to `true`.
///
/// The subscription is registered before the wait starts and removed on
/// every exit path; dropping the returned future drops the subscription
/// handle, which tears it down as well. Notified and timed-out waits both
/// return `Ok(())`: either way the caller should attempt the claim again.
///
/// # Errors
///
/// * `LockError::Cancelled` if `cancel` fired first
/// * the backend's error if subscribing or unsubscribing failed; a failed
///   subscribe returns immediately instead of waiting out `timeout`
#[instrument(level = "debug", skip(backend, cancel))]
pub async fn await_release<B: KeyValueBackend>(
    backend: &B,
    channel: &str,
    timeout: Duration,
    cancel: Option<&mut watch::Receiver<bool>>,
) -> LockResult<()> {
    // Single-fire latch: the first message releases the waiter, later ones
    // find the sender already taken.
    let (latch, released) = oneshot::channel::<()>();
    let latch = Mutex::new(Some(latch));
    let subscription = backend
        .subscribe(
            channel,
            Box::new(move |_payload| {
                let sender = latch.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    let _ = sender.send(());
                }
            }),
        )
        .await?;

    let outcome = tokio::select! {
        _ = released => WaitOutcome::Notified,
        _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
        _ = cancelled(cancel) => WaitOutcome::Cancelled,
    };
    debug!(outcome = ?outcome, "release wait finished");

    let teardown = subscription.unsubscribe().await;
    match outcome {
        WaitOutcome::Cancelled => {
            if let Err(e) = teardown {
                warn!(error = %e, "failed to unsubscribe after cancelled wait");
            }
            Err(LockError::Cancelled)
        }
        WaitOutcome::Notified | WaitOutcome::TimedOut => teardown,
    }
}

/// Resolves once `cancel` holds `true`. Never resolves for `None` or when the
/// sending side is dropped without cancelling.
pub(crate) async fn cancelled(cancel: Option<&mut watch::Receiver<bool>>) {
    let Some(cancel) = cancel else {
        return std::future::pending().await;
    };

    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
