//! General multi-node placement: greedy fill in inventory order.

use jobgrid_core::PolicyKind;
use jobgrid_state::{AllocationRecord, ResourceLedger};
use tracing::{debug, info};

use crate::error::PlacementResult;
use crate::policy::{AllocationPolicy, Share, commit_shares, split_memory};
use crate::request::JobRequest;

/// Take as many CPUs as each node has free, in order, until the request
/// is covered.
///
/// The aggregate free CPU and memory counts are checked up front, and so
/// is each planned node's memory share; if any check fails, nothing is
/// reserved. Nodes with no free CPUs are skipped and never get a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralMultiNode;

impl AllocationPolicy for GeneralMultiNode {
    fn kind(&self) -> PolicyKind {
        PolicyKind::GeneralMultiNode
    }

    fn allocate(
        &self,
        ledger: &dyn ResourceLedger,
        request: &JobRequest,
    ) -> PlacementResult<Vec<AllocationRecord>> {
        request.validate()?;

        let nodes = ledger.nodes()?;
        let free: u64 = nodes.iter().map(|n| u64::from(n.available_cpus)).sum();
        if free < u64::from(request.cpus) {
            info!(
                user = %request.user_id,
                cpus = request.cpus,
                free,
                "cluster-wide free CPUs below request"
            );
            return Ok(Vec::new());
        }

        let mut remaining = request.cpus;
        let mut planned = Vec::new();
        for node in nodes.iter().filter(|n| n.available_cpus > 0) {
            if remaining == 0 {
                break;
            }
            let take = node.available_cpus.min(remaining);
            planned.push((node, take));
            remaining -= take;
        }

        let free_memory: u64 = nodes.iter().map(|n| n.available_memory_bytes).sum();
        if free_memory < request.memory_bytes {
            info!(
                user = %request.user_id,
                memory = request.memory_bytes,
                free_memory,
                "cluster-wide free memory below request"
            );
            return Ok(Vec::new());
        }

        let cpu_plan: Vec<u32> = planned.iter().map(|(_, cpus)| *cpus).collect();
        let memory_plan = split_memory(request.memory_bytes, &cpu_plan);
        for ((node, _), &memory_bytes) in planned.iter().zip(&memory_plan) {
            if node.available_memory_bytes < memory_bytes {
                info!(
                    user = %request.user_id,
                    node = %node.id,
                    planned_memory = memory_bytes,
                    available_memory = node.available_memory_bytes,
                    "greedy memory share does not fit, nothing reserved"
                );
                return Ok(Vec::new());
            }
        }

        let shares: Vec<Share<'_>> = planned
            .into_iter()
            .zip(memory_plan)
            .map(|((node, cpus), memory_bytes)| Share {
                node,
                cpus,
                memory_bytes,
            })
            .collect();

        debug!(user = %request.user_id, nodes = shares.len(), "greedy plan built");
        commit_shares(ledger, request, &shares)
    }
}
