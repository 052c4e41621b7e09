//! Claim key and release channel naming.

use crate::error::{LockError, LockResult};

/// Prefix of the key whose presence marks a resource as claimed.
pub const CLAIM_KEY_PREFIX: &str = "lock_";

/// Prefix of the channel release notifications are published on.
pub const RELEASE_CHANNEL_PREFIX: &str = "release_lock_";

/// Backend names derived from a resource name.
///
/// Both names are a fixed prefix plus the resource name, so distinct
/// resources never share a key or a channel, and a claim key can never be
/// mistaken for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeys {
    name: String,
    claim_key: String,
    release_channel: String,
}

impl LockKeys {
    /// Derives the claim key and release channel for `name`.
    ///
    /// # Errors
    ///
    /// Returns `LockError::InvalidName` if `name` is empty.
    pub fn new(name: impl Into<String>) -> LockResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(LockError::InvalidName(
                "lock name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            claim_key: format!("{CLAIM_KEY_PREFIX}{name}"),
            release_channel: format!("{RELEASE_CHANNEL_PREFIX}{name}"),
            name,
        })
    }

    /// The resource name this lock guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key written by a successful claim.
    pub fn claim_key(&self) -> &str {
        &self.claim_key
    }

    /// Channel release notifications are published on.
    pub fn release_channel(&self) -> &str {
        &self.release_channel
    }
}
