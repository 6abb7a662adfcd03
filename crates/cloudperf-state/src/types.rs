//! Persisted ledger records.

use serde::{Deserialize, Serialize};

// ── Init invocations ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InitStatus {
    /// Invocation issued, outcome not yet recorded.
    Pending,
    Completed,
    Failed { reason: String },
}

/// The ledger entry for one init identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRecord {
    pub identity: String,
    pub target: String,
    pub status: InitStatus,
    /// Number of invocations issued for this identity.
    pub attempts: u32,
    pub updated_at: u64,
}

impl InitRecord {
    pub fn is_completed(&self) -> bool {
        self.status == InitStatus::Completed
    }
}

/// Result of trying to start an init invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitClaim {
    /// The caller owns the invocation; the record is now `Pending`.
    Started(InitRecord),
    AlreadyCompleted,
    /// Another caller holds a `Pending` record that has not yet expired.
    InProgress(InitRecord),
}

// ── Ingestions ─────────────────────────────────────────────────────

/// Per-cycle ingestion state: `Uploaded → AdminInvoked → {Applied | Failed}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestionStatus {
    Uploaded,
    AdminInvoked,
    Applied,
    Failed { reason: String },
}

impl IngestionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Applied | IngestionStatus::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: &IngestionStatus) -> bool {
        matches!(
            (self, next),
            (IngestionStatus::Uploaded, IngestionStatus::AdminInvoked)
                | (IngestionStatus::Uploaded, IngestionStatus::Failed { .. })
                | (IngestionStatus::AdminInvoked, IngestionStatus::Applied)
                | (IngestionStatus::AdminInvoked, IngestionStatus::Failed { .. })
        )
    }
}

/// One ingestion cycle: a single rule firing for a single object write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRecord {
    /// Assigned by the store on insert.
    #[serde(default)]
    pub seq: u64,
    pub bucket: String,
    pub key: String,
    /// Index of the event rule that fired.
    pub rule: usize,
    pub target: String,
    pub idempotency_key: String,
    pub status: IngestionStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl IngestionRecord {
    pub fn table_key(&self) -> String {
        seq_key(self.seq)
    }
}

pub(crate) fn seq_key(seq: u64) -> String {
    format!("{seq:020}")
}

// ── Idempotency ────────────────────────────────────────────────────

/// A handler's claim on an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyClaim {
    pub key: String,
    /// Free-form description of what was applied, e.g. the object URI.
    pub holder: String,
    pub claimed_at: u64,
}

// ── Deployments ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub stack: String,
    /// sha256 hex of the serialized configuration.
    pub config_digest: String,
    pub completed: bool,
    pub init_identity: Option<String>,
    pub deployed_at: u64,
}

pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
