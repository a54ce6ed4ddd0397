//! Resource ledger — per-node remaining capacity with optimistic commits.
//!
//! A reservation reads the node, checks capacity locally, then opens a
//! write transaction that commits only if the node's `version` is still the
//! one that was read. A changed version is a conflict: nothing is written
//! and the caller retries the same node, up to the store's
//! `reserve_attempts`. The capacity decrement, the new request id and the
//! allocation record are written in that single transaction.

use redb::{ReadableDatabase, ReadableTable};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, decode, encode};
use crate::tables::*;
use crate::types::*;

/// Read and conditionally decrement per-node capacity.
///
/// Implemented by [`StateStore`]; allocation policies only see this trait.
pub trait ResourceLedger: Send + Sync {
    /// All nodes in inventory order.
    fn nodes(&self) -> StateResult<Vec<Node>>;

    /// Current snapshot of one node.
    fn get(&self, node_id: &str) -> StateResult<Option<Node>>;

    /// Decrement the node's capacity and persist the allocation record.
    ///
    /// Conflicts are retried internally; `Conflict` is only returned once
    /// the attempt budget is spent.
    fn reserve(&self, reservation: &Reservation) -> StateResult<ReserveOutcome>;
}

impl ResourceLedger for StateStore {
    fn nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let mut nodes: Vec<Node> = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            nodes.push(decode(value.value())?);
        }
        nodes.sort_by_key(|n| n.position);
        Ok(nodes)
    }

    fn get(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn reserve(&self, reservation: &Reservation) -> StateResult<ReserveOutcome> {
        for attempt in 1..=self.reserve_attempts {
            let snapshot = self
                .get(&reservation.node_id)?
                .ok_or_else(|| StateError::NotFound(format!("node {}", reservation.node_id)))?;

            match self.try_reserve(&snapshot, reservation)? {
                ReserveOutcome::Conflict => {
                    warn!(
                        node = %reservation.node_id,
                        attempt,
                        max_attempts = self.reserve_attempts,
                        "reservation lost a race, retrying"
                    );
                }
                outcome => return Ok(outcome),
            }
        }
        Ok(ReserveOutcome::Conflict)
    }
}

impl StateStore {
    /// Register a node from the inventory.
    ///
    /// Idempotent: an existing node keeps its current availability so a
    /// restart does not hand out capacity that is already reserved.
    /// Returns `true` if the node was created.
    pub fn register_node(&self, node: &Node) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored: Option<Node> = {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let stored: Option<Node> = match table.get(node.id.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            if stored.is_none() {
                let value = encode(node)?;
                table
                    .insert(node.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;

        let Some(stored) = stored else {
            info!(node = %node.id, hostname = %node.hostname, cpus = node.total_cpus, "node registered");
            return Ok(true);
        };

        let drift = inventory_drift(&stored, node);
        if drift.is_empty() {
            debug!(node = %node.id, "node already registered, keeping current availability");
        } else {
            warn!(
                node = %node.id,
                fields = ?drift,
                stored_position = stored.position,
                configured_position = node.position,
                "configured node differs from stored node, keeping stored values"
            );
        }
        Ok(false)
    }

    /// One read-compute-commit attempt against an explicit snapshot.
    ///
    /// Commits only if the stored node still carries `snapshot.version`.
    /// Never retries; [`ResourceLedger::reserve`] loops over this.
    pub fn try_reserve(
        &self,
        snapshot: &Node,
        reservation: &Reservation,
    ) -> StateResult<ReserveOutcome> {
        if !snapshot.can_fit(reservation.cpus, reservation.memory_bytes) {
            debug!(
                node = %snapshot.id,
                cpus = reservation.cpus,
                available_cpus = snapshot.available_cpus,
                memory = reservation.memory_bytes,
                available_memory = snapshot.available_memory_bytes,
                "insufficient capacity"
            );
            return Ok(ReserveOutcome::InsufficientCapacity);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        let current: Node = {
            let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let stored: Option<Node> = match table.get(snapshot.id.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            stored.ok_or_else(|| StateError::NotFound(format!("node {}", snapshot.id)))?
        };

        if current.version != snapshot.version {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(
                node = %snapshot.id,
                read_version = snapshot.version,
                current_version = current.version,
                "node changed since read"
            );
            return Ok(ReserveOutcome::Conflict);
        }

        let req_id = bump_counter(&txn)?;

        let mut updated = current;
        updated.available_cpus -= reservation.cpus;
        updated.available_memory_bytes -= reservation.memory_bytes;
        updated.version += 1;

        let record = AllocationRecord {
            req_id,
            user_id: reservation.user_id.clone(),
            node_id: updated.id.clone(),
            hostname: updated.hostname.clone(),
            cpus_allocated: reservation.cpus,
            memory_allocated: reservation.memory_bytes,
            index: reservation.index,
            job_id: reservation.job_id.unwrap_or(req_id),
        };

        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let value = encode(&updated)?;
            table
                .insert(updated.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        {
            let mut table = txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
            let value = encode(&record)?;
            table
                .insert(req_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(
            node = %record.node_id,
            req_id,
            cpus = record.cpus_allocated,
            index = record.index,
            available_cpus = updated.available_cpus,
            "reservation committed"
        );
        Ok(ReserveOutcome::Reserved(record))
    }

    /// Return one record's CPUs and memory to its node and delete the record.
    ///
    /// Availability is capped at the node totals. Returns the released
    /// record, or `None` if no record exists for `req_id` (already released
    /// or never created). The request id stays in its user queue;
    /// retrieval skips ids without a record.
    pub fn release(&self, req_id: ReqId) -> StateResult<Option<AllocationRecord>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        let record: Option<AllocationRecord> = {
            let mut table = txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
            let removed = table.remove(req_id).map_err(map_err!(Write))?;
            match removed {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            }
        };

        let Some(record) = record else {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(req_id, "nothing to release");
            return Ok(None);
        };

        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let node: Option<Node> = match table.get(record.node_id.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let mut node =
                node.ok_or_else(|| StateError::NotFound(format!("node {}", record.node_id)))?;

            node.available_cpus = node
                .available_cpus
                .saturating_add(record.cpus_allocated)
                .min(node.total_cpus);
            node.available_memory_bytes = node
                .available_memory_bytes
                .saturating_add(record.memory_allocated)
                .min(node.total_memory_bytes);
            node.version += 1;

            let value = encode(&node)?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        info!(
            req_id,
            node = %record.node_id,
            cpus = record.cpus_allocated,
            "allocation released"
        );
        Ok(Some(record))
    }
}

/// Fields of a configured node that no longer match what the store holds.
pub(crate) fn inventory_drift(stored: &Node, configured: &Node) -> Vec<&'static str> {
    let mut drift = Vec::new();
    if stored.position != configured.position {
        drift.push("position");
    }
    if stored.hostname != configured.hostname {
        drift.push("hostname");
    }
    if stored.total_cpus != configured.total_cpus {
        drift.push("total_cpus");
    }
    if stored.total_memory_bytes != configured.total_memory_bytes {
        drift.push("total_memory_bytes");
    }
    drift
}

/// Increment `next_request_id` inside an open write transaction.
///
/// The first id handed out is 1.
pub(crate) fn bump_counter(txn: &redb::WriteTransaction) -> StateResult<ReqId> {
    let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
    let last = table
        .get(NEXT_REQUEST_ID)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    table
        .insert(NEXT_REQUEST_ID, next)
        .map_err(map_err!(Write))?;
    Ok(next)
}
