//! Example: Using Redis distributed locks
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_URL environment variable
//! or modify the URL below. Run two copies side by side to watch the
//! second one wait for the first one's release.

use pubsub_lock::RedisLockProvider;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Get Redis URL from environment or use default
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis...");
    let provider = RedisLockProvider::builder()
        .url(&redis_url)
        .timeout(Duration::from_secs(5))
        .build()
        .await?;

    // Create a lock by name
    let lock = provider.create_lock("checkout-42")?;
    println!(
        "Created lock: {} (key {}, channel {})",
        lock.name(),
        lock.keys().claim_key(),
        lock.keys().release_channel()
    );

    // Non-blocking attempt first
    if !lock.try_lock().await? {
        println!("Lock is held elsewhere, waiting for its release...");
        lock.acquire().await?;
    }
    println!("Lock acquired!");

    // Keep the critical section shorter than the timeout: claims are not renewed
    println!("Doing work...");
    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("Work completed");

    // Release the lock and notify waiters
    lock.release().await?;
    println!("Lock released");

    // Bounded attempt
    if lock.try_lock_for(Duration::from_secs(1)).await? {
        println!("Re-acquired within one second");
        lock.release().await?;
    }

    Ok(())
}
