//! Round-robin placement: an even split across every node.

use jobgrid_core::PolicyKind;
use jobgrid_state::{AllocationRecord, ResourceLedger};
use tracing::{debug, info};

use crate::error::PlacementResult;
use crate::policy::{AllocationPolicy, Share, commit_shares, split_memory};
use crate::request::JobRequest;

/// Spread the request over all nodes, `cpus / n` each, with the first
/// `cpus % n` nodes taking one extra.
///
/// Every node's share is checked against its snapshot before anything is
/// reserved, so an infeasible plan leaves the ledger untouched. Nodes whose
/// share is zero get no record and consume no index.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

/// Per-node CPU counts for `cpus` spread over `node_count` nodes.
pub fn round_robin_plan(cpus: u32, node_count: usize) -> Vec<u32> {
    if node_count == 0 {
        return Vec::new();
    }
    let n = node_count as u32;
    let base = cpus / n;
    let remainder = cpus % n;
    (0..n).map(|i| base + u32::from(i < remainder)).collect()
}

impl AllocationPolicy for RoundRobin {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn allocate(
        &self,
        ledger: &dyn ResourceLedger,
        request: &JobRequest,
    ) -> PlacementResult<Vec<AllocationRecord>> {
        request.validate()?;

        let nodes = ledger.nodes()?;
        let cpu_plan = round_robin_plan(request.cpus, nodes.len());
        let memory_plan = split_memory(request.memory_bytes, &cpu_plan);

        for ((node, &cpus), &memory_bytes) in nodes.iter().zip(&cpu_plan).zip(&memory_plan) {
            if node.available_cpus < cpus || node.available_memory_bytes < memory_bytes {
                info!(
                    user = %request.user_id,
                    node = %node.id,
                    planned_cpus = cpus,
                    available_cpus = node.available_cpus,
                    planned_memory = memory_bytes,
                    available_memory = node.available_memory_bytes,
                    "round-robin share does not fit, nothing reserved"
                );
                return Ok(Vec::new());
            }
        }

        let shares: Vec<Share<'_>> = nodes
            .iter()
            .zip(cpu_plan)
            .zip(memory_plan)
            .filter(|((_, cpus), _)| *cpus > 0)
            .map(|((node, cpus), memory_bytes)| Share {
                node,
                cpus,
                memory_bytes,
            })
            .collect();

        debug!(user = %request.user_id, nodes = shares.len(), "round-robin plan passed pre-check");
        commit_shares(ledger, request, &shares)
    }
}
