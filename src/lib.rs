//! Distributed mutex for Rust, held in a key-value store and woken by
//! publish/subscribe release notifications.
//!
//! A lock on resource `name` is claimed by atomically setting `lock_{name}`
//! only if it is absent, with a TTL. Waiters subscribe to
//! `release_lock_{name}` and retry when a release is published, or after the
//! timeout if the notification never arrives.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pubsub_lock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = RedisLockProvider::builder()
//!         .url("redis://localhost:6379")
//!         .timeout(Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     let lock = provider.create_lock("checkout-42")?;
//!
//!     // Blocks until the claim succeeds
//!     lock.acquire().await?;
//!
//!     // Critical section - we have exclusive access
//!     println!("Doing critical work...");
//!
//!     // Deletes the claim and wakes waiters in other processes
//!     lock.release().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! ## Redis
//!
//! `SET NX PX` claims, `DEL` + `PUBLISH` releases, and a dedicated
//! subscriber connection for waiters.
//!
//! ## In-memory
//!
//! [`InMemoryBackend`] keeps everything in process. Locks sharing one
//! instance behave like processes sharing one store.
//!
//! ```rust
//! use pubsub_lock::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> LockResult<()> {
//! let backend = Arc::new(InMemoryBackend::new());
//! let a = PubSubLock::new(backend.clone(), "jobs", Duration::from_secs(5))?;
//! let b = PubSubLock::new(backend, "jobs", Duration::from_secs(5))?;
//!
//! assert!(a.try_lock().await?);
//! assert!(!b.try_lock().await?);
//! a.release().await?;
//! assert!(b.try_lock().await?);
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! - **Mutual exclusion**: at most one claim per resource at a time, as far
//!   as the store's set-if-absent is atomic
//! - **No busy polling**: waiters sleep until notified or timed out
//! - **Self-healing waits**: a lost notification delays a waiter by at most
//!   one timeout
//!
//! Claims are not renewed and releases are not ownership-checked; see
//! [`PubSubLock`].
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `pubsub-lock-core`: lock protocol, backend trait, in-memory backend
//! - `pubsub-lock-redis`: Redis backend

// Re-export core types and traits
pub use pubsub_lock_core::*;

// Re-export redis backend
pub use pubsub_lock_redis::*;
