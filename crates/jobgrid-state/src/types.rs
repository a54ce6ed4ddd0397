//! Domain types for the jobgrid state store.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the inventory.
pub type NodeId = String;

/// Identifier of the user that owns a job queue.
pub type UserId = String;

/// Request id handed out by the `next_request_id` counter.
pub type ReqId = u64;

// ── Node ──────────────────────────────────────────────────────────

/// A schedulable host and its remaining capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    /// Position in the static inventory; policies scan in this order.
    pub position: u32,
    pub total_cpus: u32,
    pub total_memory_bytes: u64,
    pub available_cpus: u32,
    pub available_memory_bytes: u64,
    /// Bumped on every committed write. Reservations commit only if the
    /// version they read is still current.
    pub version: u64,
}

impl Node {
    /// A fresh node with its full capacity available.
    pub fn new(
        position: u32,
        id: impl Into<NodeId>,
        hostname: impl Into<String>,
        total_cpus: u32,
        total_memory_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            position,
            total_cpus,
            total_memory_bytes,
            available_cpus: total_cpus,
            available_memory_bytes: total_memory_bytes,
            version: 0,
        }
    }

    pub fn can_fit(&self, cpus: u32, memory_bytes: u64) -> bool {
        self.available_cpus >= cpus && self.available_memory_bytes >= memory_bytes
    }

    pub fn used_cpus(&self) -> u32 {
        self.total_cpus.saturating_sub(self.available_cpus)
    }
}

// ── Reservations ──────────────────────────────────────────────────

/// One node's share of a job, as asked of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub node_id: NodeId,
    pub user_id: UserId,
    pub cpus: u32,
    pub memory_bytes: u64,
    /// Position of this node within the job (0 = first node touched).
    pub index: u32,
    /// Request id of the job's first record; `None` when this reservation
    /// is that first record.
    pub job_id: Option<ReqId>,
}

/// Result of a single reservation against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Capacity decremented and the record persisted in the same commit.
    Reserved(AllocationRecord),
    /// The node does not have enough CPUs or memory. Nothing was written.
    InsufficientCapacity,
    /// Another writer changed the node between read and commit, on every
    /// allowed attempt. Nothing was written.
    Conflict,
}

// ── Allocation records ────────────────────────────────────────────

/// Persisted proof that a job claimed part of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationRecord {
    pub req_id: ReqId,
    pub user_id: UserId,
    pub node_id: NodeId,
    pub hostname: String,
    pub cpus_allocated: u32,
    pub memory_allocated: u64,
    /// 0 marks the first record of a job; later nodes count up from there.
    pub index: u32,
    /// Request id of the job's `index == 0` record. Identifies the job even
    /// after that record has been released.
    pub job_id: ReqId,
}

impl AllocationRecord {
    pub fn starts_job(&self) -> bool {
        self.index == 0
    }

    /// Whether `self` comes from a different job than `other`.
    pub fn is_other_job(&self, other: &AllocationRecord) -> bool {
        self.starts_job() || self.job_id != other.job_id
    }
}

// ── Workers ───────────────────────────────────────────────────────

/// A running worker as reported by the orchestration backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerStatus {
    pub name: String,
    pub host_node: String,
    pub cpus_allocated: u32,
}
