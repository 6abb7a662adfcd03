//! StateStore — redb-backed ledger persistence.
//!
//! Typed operations over init records, ingestion cycles, idempotency
//! claims and deployment records. Every mutation runs in its own write
//! transaction; redb serializes writers, so read-modify-write sequences
//! inside one transaction (sequence allocation, claims, transitions) are
//! atomic with respect to other callers.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const INGESTION_SEQ: &str = "ingestion_seq";

/// Thread-safe ledger backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Ephemeral in-memory ledger.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(INIT_INVOCATIONS).map_err(map_err!(Table))?;
        txn.open_table(INGESTIONS).map_err(map_err!(Table))?;
        txn.open_table(IDEMPOTENCY).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON access ────────────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, def: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    // ── Sequences ──────────────────────────────────────────────────

    /// Increment and return the named counter. The first value is 1.
    pub fn allocate_sequence(&self, name: &str) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            let current: u64 = match table.get(name).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => 0,
            };
            next = current + 1;
            let bytes = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table.insert(name, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(next)
    }

    // ── Init invocations ───────────────────────────────────────────

    pub fn put_init(&self, record: &InitRecord) -> StateResult<()> {
        self.put_json(INIT_INVOCATIONS, &record.identity, record)?;
        debug!(identity = %record.identity, status = ?record.status, "init record stored");
        Ok(())
    }

    /// Check and mark an init identity `Pending` in one write transaction.
    ///
    /// A `Pending` record older than `lease_secs` is taken over, since its
    /// holder exited without recording an outcome.
    pub fn begin_init(&self, identity: &str, target: &str, lease_secs: u64) -> StateResult<InitClaim> {
        let now = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let claim;
        {
            let mut table = txn.open_table(INIT_INVOCATIONS).map_err(map_err!(Table))?;
            let previous: Option<InitRecord> = match table.get(identity).map_err(map_err!(Read))? {
                Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
                None => None,
            };
            claim = match previous {
                Some(record) if record.is_completed() => InitClaim::AlreadyCompleted,
                Some(record)
                    if record.status == InitStatus::Pending
                        && now.saturating_sub(record.updated_at) < lease_secs =>
                {
                    InitClaim::InProgress(record)
                }
                previous => {
                    let record = InitRecord {
                        identity: identity.to_string(),
                        target: target.to_string(),
                        status: InitStatus::Pending,
                        attempts: previous.map_or(0, |r| r.attempts) + 1,
                        updated_at: now,
                    };
                    let bytes = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table.insert(identity, bytes.as_slice()).map_err(map_err!(Write))?;
                    InitClaim::Started(record)
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(identity, ?claim, "init claim");
        Ok(claim)
    }

    pub fn get_init(&self, identity: &str) -> StateResult<Option<InitRecord>> {
        self.get_json(INIT_INVOCATIONS, identity)
    }

    pub fn list_inits(&self) -> StateResult<Vec<InitRecord>> {
        self.list_json(INIT_INVOCATIONS)
    }

    // ── Ingestions ─────────────────────────────────────────────────

    /// Insert a new cycle, assigning its sequence number.
    pub fn insert_ingestion(&self, record: &IngestionRecord) -> StateResult<IngestionRecord> {
        let mut record = record.clone();
        record.seq = self.allocate_sequence(INGESTION_SEQ)?;
        self.put_json(INGESTIONS, &record.table_key(), &record)?;
        debug!(seq = record.seq, key = %record.key, rule = record.rule, "ingestion recorded");
        Ok(record)
    }

    pub fn get_ingestion(&self, seq: u64) -> StateResult<Option<IngestionRecord>> {
        self.get_json(INGESTIONS, &seq_key(seq))
    }

    /// All cycles in arrival order.
    pub fn list_ingestions(&self) -> StateResult<Vec<IngestionRecord>> {
        self.list_json(INGESTIONS)
    }

    pub fn list_ingestions_for_key(&self, bucket: &str, key: &str) -> StateResult<Vec<IngestionRecord>> {
        Ok(self
            .list_ingestions()?
            .into_iter()
            .filter(|r| r.bucket == bucket && r.key == key)
            .collect())
    }

    /// Move a cycle to its next state, rejecting illegal transitions.
    pub fn transition_ingestion(&self, seq: u64, next: IngestionStatus) -> StateResult<IngestionRecord> {
        let key = seq_key(seq);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(INGESTIONS).map_err(map_err!(Table))?;
            let mut current: IngestionRecord = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(format!("ingestion {seq}"))),
            };
            if !current.status.can_advance_to(&next) {
                return Err(StateError::InvalidTransition {
                    seq,
                    from: format!("{:?}", current.status),
                    to: format!("{next:?}"),
                });
            }
            current.status = next;
            current.updated_at = epoch_secs();
            let bytes = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            record = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(seq, status = ?record.status, "ingestion transitioned");
        Ok(record)
    }

    // ── Idempotency ────────────────────────────────────────────────

    /// Claim a key. Returns `false` if it was already claimed.
    pub fn claim_idempotency(&self, key: &str, holder: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let claimed;
        {
            let mut table = txn.open_table(IDEMPOTENCY).map_err(map_err!(Table))?;
            let exists = table.get(key).map_err(map_err!(Read))?.is_some();
            if exists {
                claimed = false;
            } else {
                let claim = IdempotencyClaim {
                    key: key.to_string(),
                    holder: holder.to_string(),
                    claimed_at: epoch_secs(),
                };
                let bytes = serde_json::to_vec(&claim).map_err(map_err!(Serialize))?;
                table.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
                claimed = true;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key, claimed, "idempotency claim");
        Ok(claimed)
    }

    pub fn get_claim(&self, key: &str) -> StateResult<Option<IdempotencyClaim>> {
        self.get_json(IDEMPOTENCY, key)
    }

    /// Drop a claim so the key can be applied again. Returns true if it existed.
    pub fn release_idempotency(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(IDEMPOTENCY).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Deployments ────────────────────────────────────────────────

    pub fn put_deployment(&self, record: &DeploymentRecord) -> StateResult<()> {
        self.put_json(DEPLOYMENTS, &record.stack, record)?;
        debug!(stack = %record.stack, digest = %record.config_digest, "deployment recorded");
        Ok(())
    }

    pub fn get_deployment(&self, stack: &str) -> StateResult<Option<DeploymentRecord>> {
        self.get_json(DEPLOYMENTS, stack)
    }

    pub fn list_deployments(&self) -> StateResult<Vec<DeploymentRecord>> {
        self.list_json(DEPLOYMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestion(key: &str) -> IngestionRecord {
        IngestionRecord {
            seq: 0,
            bucket: "data".to_string(),
            key: key.to_string(),
            rule: 0,
            target: "admin".to_string(),
            idempotency_key: format!("k-{key}"),
            status: IngestionStatus::Uploaded,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn init(identity: &str, status: InitStatus) -> InitRecord {
        InitRecord {
            identity: identity.to_string(),
            target: "admin".to_string(),
            status,
            attempts: 1,
            updated_at: 1000,
        }
    }

    // ── Sequences ──────────────────────────────────────────────────

    #[test]
    fn sequences_are_independent_and_monotonic() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.allocate_sequence("a").unwrap(), 1);
        assert_eq!(store.allocate_sequence("a").unwrap(), 2);
        assert_eq!(store.allocate_sequence("b").unwrap(), 1);
    }

    // ── Init ───────────────────────────────────────────────────────

    #[test]
    fn init_put_get_and_overwrite() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_init("init-db").unwrap().is_none());

        store
            .put_init(&init(
                "init-db",
                InitStatus::Failed {
                    reason: "boom".to_string(),
                },
            ))
            .unwrap();
        assert!(!store.get_init("init-db").unwrap().unwrap().is_completed());

        let mut done = init("init-db", InitStatus::Completed);
        done.attempts = 2;
        store.put_init(&done).unwrap();
        let got = store.get_init("init-db").unwrap().unwrap();
        assert!(got.is_completed());
        assert_eq!(got.attempts, 2);
        assert_eq!(store.list_inits().unwrap().len(), 1);
    }

    #[test]
    fn begin_init_is_exclusive_while_pending() {
        let store = StateStore::open_in_memory().unwrap();
        let InitClaim::Started(first) = store.begin_init("init-db", "admin", 60).unwrap() else {
            panic!("first caller must start");
        };
        assert_eq!(first.attempts, 1);
        assert!(matches!(
            store.begin_init("init-db", "admin", 60).unwrap(),
            InitClaim::InProgress(_)
        ));

        let mut done = first;
        done.status = InitStatus::Completed;
        store.put_init(&done).unwrap();
        assert_eq!(
            store.begin_init("init-db", "admin", 60).unwrap(),
            InitClaim::AlreadyCompleted
        );
    }

    #[test]
    fn expired_pending_and_failed_inits_restart() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_init(&init("stale", InitStatus::Pending)).unwrap();
        let InitClaim::Started(taken) = store.begin_init("stale", "admin", 60).unwrap() else {
            panic!("stale pending record must be taken over");
        };
        assert_eq!(taken.attempts, 2);

        store
            .put_init(&init(
                "failed",
                InitStatus::Failed {
                    reason: "boom".to_string(),
                },
            ))
            .unwrap();
        assert!(matches!(
            store.begin_init("failed", "admin", 60).unwrap(),
            InitClaim::Started(InitRecord { attempts: 2, .. })
        ));
    }

    // ── Ingestions ─────────────────────────────────────────────────

    #[test]
    fn ingestion_insert_assigns_sequence() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.insert_ingestion(&ingestion("import-sql/a.sql")).unwrap();
        let b = store.insert_ingestion(&ingestion("import-sql/a.sql")).unwrap();
        assert_eq!((a.seq, b.seq), (1, 2));

        let all = store.list_ingestions().unwrap();
        assert_eq!(all.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.list_ingestions_for_key("data", "import-sql/a.sql").unwrap().len(), 2);
        assert!(store.list_ingestions_for_key("data", "other").unwrap().is_empty());
    }

    #[test]
    fn ingestion_follows_state_machine() {
        let store = StateStore::open_in_memory().unwrap();
        let rec = store.insert_ingestion(&ingestion("k.sql")).unwrap();

        let err = store.transition_ingestion(rec.seq, IngestionStatus::Applied).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));

        store
            .transition_ingestion(rec.seq, IngestionStatus::AdminInvoked)
            .unwrap();
        let done = store.transition_ingestion(rec.seq, IngestionStatus::Applied).unwrap();
        assert_eq!(done.status, IngestionStatus::Applied);
        assert_eq!(store.get_ingestion(rec.seq).unwrap().unwrap().status, IngestionStatus::Applied);

        // Terminal.
        assert!(
            store
                .transition_ingestion(
                    rec.seq,
                    IngestionStatus::Failed {
                        reason: "late".to_string()
                    }
                )
                .is_err()
        );
    }

    #[test]
    fn transition_missing_ingestion_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(
            store.transition_ingestion(42, IngestionStatus::AdminInvoked),
            Err(StateError::NotFound(_))
        ));
    }

    // ── Idempotency ────────────────────────────────────────────────

    #[test]
    fn claim_is_exclusive_until_released() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.claim_idempotency("abc", "s3://data/a.sql").unwrap());
        assert!(!store.claim_idempotency("abc", "s3://data/a.sql").unwrap());
        assert_eq!(store.get_claim("abc").unwrap().unwrap().holder, "s3://data/a.sql");

        assert!(store.release_idempotency("abc").unwrap());
        assert!(!store.release_idempotency("abc").unwrap());
        assert!(store.claim_idempotency("abc", "again").unwrap());
    }

    // ── Deployments ────────────────────────────────────────────────

    #[test]
    fn deployment_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let record = DeploymentRecord {
            stack: "cloudperf".to_string(),
            config_digest: "d1".to_string(),
            completed: true,
            init_identity: Some("init-db".to_string()),
            deployed_at: 1000,
        };
        store.put_deployment(&record).unwrap();
        assert_eq!(store.get_deployment("cloudperf").unwrap(), Some(record));
        assert_eq!(store.list_deployments().unwrap().len(), 1);
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");

        {
            let store = StateStore::open(&path).unwrap();
            store.put_init(&init("init-db", InitStatus::Completed)).unwrap();
            store.insert_ingestion(&ingestion("a.sql")).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert!(store.get_init("init-db").unwrap().unwrap().is_completed());
        // Sequence continues after reopen.
        assert_eq!(store.insert_ingestion(&ingestion("b.sql")).unwrap().seq, 2);
    }
}
