//! The allocation policy seam and the commit loop shared by all strategies.
//!
//! A policy turns a [`JobRequest`] into a plan of per-node shares and then
//! commits the plan share by share through [`ResourceLedger::reserve`].
//! Each committed share is one [`AllocationRecord`]; indices are handed
//! out 0, 1, 2… in commit order.

use jobgrid_core::PolicyKind;
use jobgrid_state::{AllocationRecord, Node, ReserveOutcome, Reservation, ResourceLedger};
use tracing::{debug, warn};

use crate::error::{PlacementError, PlacementResult};
use crate::multi_node::GeneralMultiNode;
use crate::request::JobRequest;
use crate::round_robin::RoundRobin;
use crate::single_node::SingleNode;

/// A strategy for carving a request out of the node inventory.
pub trait AllocationPolicy: Send + Sync {
    fn kind(&self) -> PolicyKind;

    /// Reserve capacity for `request` and return the committed records.
    ///
    /// An empty list means no feasible allocation exists; the ledger was
    /// not mutated. Errors mean the store failed or a multi-node commit
    /// was cut short (see [`PlacementError::committed`]).
    fn allocate(
        &self,
        ledger: &dyn ResourceLedger,
        request: &JobRequest,
    ) -> PlacementResult<Vec<AllocationRecord>>;
}

/// The policy implementation for `kind`.
pub fn policy_for(kind: PolicyKind) -> &'static dyn AllocationPolicy {
    match kind {
        PolicyKind::SingleNode => &SingleNode,
        PolicyKind::RoundRobin => &RoundRobin,
        PolicyKind::GeneralMultiNode => &GeneralMultiNode,
    }
}

/// One node's planned share of a job.
#[derive(Debug, Clone)]
pub(crate) struct Share<'a> {
    pub node: &'a Node,
    pub cpus: u32,
    pub memory_bytes: u64,
}

/// Split `memory_bytes` across CPU shares, proportional to each share.
///
/// The last share absorbs the rounding remainder, so the result always
/// sums to `memory_bytes`. Zero-CPU shares get zero memory unless every
/// share is zero, in which case everything lands on the last one.
pub fn split_memory(memory_bytes: u64, cpu_shares: &[u32]) -> Vec<u64> {
    let Some(last) = cpu_shares.len().checked_sub(1) else {
        return Vec::new();
    };
    let total_cpus: u128 = cpu_shares.iter().map(|&c| u128::from(c)).sum();

    let mut split = Vec::with_capacity(cpu_shares.len());
    let mut assigned: u64 = 0;
    for (i, &cpus) in cpu_shares.iter().enumerate() {
        let part = if i == last {
            memory_bytes - assigned
        } else if total_cpus == 0 {
            0
        } else {
            // Fits: cpus <= total_cpus, so the quotient is <= memory_bytes.
            (u128::from(memory_bytes) * u128::from(cpus) / total_cpus) as u64
        };
        assigned += part;
        split.push(part);
    }
    split
}

/// Reserve every share in order, numbering records from 0.
///
/// Capacity missing on the first share means the plan was infeasible and
/// yields an empty list. Any failure after a commit returns an error that
/// carries the committed records; they are not rolled back.
pub(crate) fn commit_shares(
    ledger: &dyn ResourceLedger,
    request: &JobRequest,
    shares: &[Share<'_>],
) -> PlacementResult<Vec<AllocationRecord>> {
    let mut committed: Vec<AllocationRecord> = Vec::with_capacity(shares.len());

    for share in shares {
        let reservation = Reservation {
            node_id: share.node.id.clone(),
            user_id: request.user_id.clone(),
            cpus: share.cpus,
            memory_bytes: share.memory_bytes,
            index: committed.len() as u32,
            job_id: committed.first().map(|r| r.req_id),
        };

        match ledger.reserve(&reservation)? {
            ReserveOutcome::Reserved(record) => {
                debug!(
                    user = %request.user_id,
                    node = %record.node_id,
                    req_id = record.req_id,
                    index = record.index,
                    cpus = record.cpus_allocated,
                    "share committed"
                );
                committed.push(record);
            }
            ReserveOutcome::InsufficientCapacity if committed.is_empty() => {
                debug!(node = %share.node.id, "first share no longer fits");
                return Ok(Vec::new());
            }
            ReserveOutcome::InsufficientCapacity => {
                warn!(
                    user = %request.user_id,
                    node = %share.node.id,
                    kept = committed.len(),
                    "capacity vanished mid-allocation, earlier shares stay reserved"
                );
                return Err(PlacementError::PartialAllocation {
                    node_id: share.node.id.clone(),
                    committed,
                });
            }
            ReserveOutcome::Conflict => {
                warn!(
                    user = %request.user_id,
                    node = %share.node.id,
                    kept = committed.len(),
                    "reservation conflict not resolved within retry budget"
                );
                return Err(PlacementError::AllocationConflict {
                    node_id: share.node.id.clone(),
                    committed,
                });
            }
        }
    }

    Ok(committed)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Ledgers for policy tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use jobgrid_state::*;

    /// An in-memory store with nodes `(id, cpus, memory)` in that order.
    pub fn store_with(nodes: &[(&str, u32, u64)]) -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        for (i, (id, cpus, mem)) in nodes.iter().enumerate() {
            store
                .register_node(&Node::new(i as u32, *id, format!("host-{id}"), *cpus, *mem))
                .unwrap();
        }
        store
    }

    pub fn available_cpus(store: &StateStore) -> Vec<u32> {
        store.nodes().unwrap().iter().map(|n| n.available_cpus).collect()
    }

    /// Wraps a store and forces an outcome for chosen nodes.
    pub struct RiggedLedger {
        pub inner: StateStore,
        pub conflict_on: HashSet<String>,
        /// Nodes that report no capacity at commit time even though their
        /// snapshot looked fine (another job got there first).
        pub drained_on: HashSet<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl RiggedLedger {
        pub fn new(inner: StateStore) -> Self {
            Self {
                inner,
                conflict_on: HashSet::new(),
                drained_on: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ResourceLedger for RiggedLedger {
        fn nodes(&self) -> StateResult<Vec<Node>> {
            self.inner.nodes()
        }

        fn get(&self, node_id: &str) -> StateResult<Option<Node>> {
            self.inner.get(node_id)
        }

        fn reserve(&self, reservation: &Reservation) -> StateResult<ReserveOutcome> {
            self.calls.lock().unwrap().push(reservation.node_id.clone());
            if self.conflict_on.contains(&reservation.node_id) {
                return Ok(ReserveOutcome::Conflict);
            }
            if self.drained_on.contains(&reservation.node_id) {
                return Ok(ReserveOutcome::InsufficientCapacity);
            }
            self.inner.reserve(reservation)
        }
    }
}
