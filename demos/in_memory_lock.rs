//! Example: Contending for a lock held in an in-process store
//!
//! Run with: `RUST_LOG=debug cargo run --example in_memory_lock`

use pubsub_lock::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(InMemoryBackend::new());
    let mut workers = Vec::new();

    for worker in 0..3 {
        // Each worker gets its own lock instance, like a separate process would
        let lock = PubSubLock::new(backend.clone(), "report", Duration::from_secs(2))?;
        workers.push(tokio::spawn(async move {
            lock.acquire().await?;
            println!("worker {worker} holds the lock");
            tokio::time::sleep(Duration::from_millis(100)).await;
            println!("worker {worker} releasing");
            lock.release().await
        }));
    }

    for worker in workers {
        worker.await??;
    }

    Ok(())
}
