//! StateStore — redb-backed persistence for jobgrid.
//!
//! This module owns opening the database and the small helpers shared by
//! the ledger (`ledger.rs`) and record (`records.rs`) operations. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing and single-process deployments).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StateResult;
use crate::tables::*;
use crate::types::WorkerStatus;

/// Optimistic commit attempts per reservation unless configured otherwise.
pub const DEFAULT_RESERVE_ATTEMPTS: u32 = 2;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) db: Arc<Database>,
    pub(crate) reserve_attempts: u32,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Set how many optimistic commits a reservation may attempt.
    ///
    /// Clamped to at least one attempt.
    pub fn with_reserve_attempts(mut self, attempts: u32) -> Self {
        self.reserve_attempts = attempts.max(1);
        self
    }

    pub fn reserve_attempts(&self) -> u32 {
        self.reserve_attempts
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            reserve_attempts: DEFAULT_RESERVE_ATTEMPTS,
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
        txn.open_table(USER_QUEUES).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Replace the stored worker snapshot with `workers`.
    ///
    /// Purely observational: the ledger is not touched.
    pub fn put_worker_snapshot(&self, workers: &[WorkerStatus]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            let stale: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?;
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for worker in workers {
                let value = encode(worker)?;
                table
                    .insert(worker.name.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = workers.len(), "worker snapshot stored");
        Ok(())
    }

    /// The last stored worker snapshot, ordered by worker name.
    pub fn list_worker_snapshot(&self) -> StateResult<Vec<WorkerStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResourceLedger;
    use crate::types::Node;

    fn worker(name: &str, host: &str, cpus: u32) -> WorkerStatus {
        WorkerStatus {
            name: name.to_string(),
            host_node: host.to_string(),
            cpus_allocated: cpus,
        }
    }

    #[test]
    fn reserve_attempts_default_and_clamp() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.reserve_attempts(), DEFAULT_RESERVE_ATTEMPTS);

        let store = store.with_reserve_attempts(0);
        assert_eq!(store.reserve_attempts(), 1);
    }

    #[test]
    fn worker_snapshot_replaces_previous() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_worker_snapshot(&[worker("worker-0-1", "gpu01", 4), worker("worker-1-2", "gpu02", 4)])
            .unwrap();
        store.put_worker_snapshot(&[worker("worker-0-3", "gpu01", 8)]).unwrap();

        let snapshot = store.list_worker_snapshot().unwrap();
        assert_eq!(snapshot, vec![worker("worker-0-3", "gpu01", 8)]);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.nodes().unwrap().is_empty());
        assert!(store.get("nope").unwrap().is_none());
        assert!(store.get_record(1).unwrap().is_none());
        assert!(store.dequeue_for_user("alice").unwrap().is_none());
        assert!(store.retrieve_job_metadata("alice").unwrap().is_empty());
        assert!(store.list_worker_snapshot().unwrap().is_empty());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.register_node(&Node::new(0, "node-1", "gpu01", 96, 1 << 30)).unwrap();
            assert_eq!(store.next_req_id().unwrap(), 1);
            store.enqueue_for_user("alice", 1).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let node = store.get("node-1").unwrap().unwrap();
        assert_eq!(node.available_cpus, 96);
        assert_eq!(store.next_req_id().unwrap(), 2);
        assert_eq!(store.dequeue_for_user("alice").unwrap(), Some(1));
    }
}
