//! Idempotency keys and the guard admin handlers check them through.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use cloudperf_state::StateStore;

use crate::error::IngestResult;

/// sha256 hex digest identifying one unit of admin work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for a specific object version. Without a version the key only
    /// identifies the object path, so re-uploads share it.
    pub fn for_object(bucket: &str, key: &str, version: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bucket.as_bytes());
        hasher.update([0]);
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(version.unwrap_or_default().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn for_content(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checked by an admin handler before applying work.
pub trait IdempotencyGuard: Send + Sync {
    /// `true` if the caller now owns the key and should apply the work.
    fn claim(&self, key: &IdempotencyKey, holder: &str) -> IngestResult<bool>;

    /// Give the key back, e.g. after the work failed.
    fn release(&self, key: &IdempotencyKey) -> IngestResult<bool>;
}

/// Guard backed by the ledger's idempotency table.
#[derive(Clone)]
pub struct LedgerGuard {
    state: StateStore,
}

impl LedgerGuard {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }
}

impl IdempotencyGuard for LedgerGuard {
    fn claim(&self, key: &IdempotencyKey, holder: &str) -> IngestResult<bool> {
        Ok(self.state.claim_idempotency(key.as_str(), holder)?)
    }

    fn release(&self, key: &IdempotencyKey) -> IngestResult<bool> {
        Ok(self.state.release_idempotency(key.as_str())?)
    }
}
