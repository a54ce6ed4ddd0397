//! Single-node placement: the whole request on one node.

use jobgrid_core::PolicyKind;
use jobgrid_state::{AllocationRecord, ResourceLedger};
use tracing::{debug, info};

use crate::error::PlacementResult;
use crate::policy::{AllocationPolicy, Share, commit_shares};
use crate::request::JobRequest;

/// Pick the first node, in inventory order, with enough free CPUs.
///
/// Only that node is tried. If its commit finds the capacity gone, the
/// request is reported infeasible rather than moving on to the next node.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleNode;

impl AllocationPolicy for SingleNode {
    fn kind(&self) -> PolicyKind {
        PolicyKind::SingleNode
    }

    fn allocate(
        &self,
        ledger: &dyn ResourceLedger,
        request: &JobRequest,
    ) -> PlacementResult<Vec<AllocationRecord>> {
        request.validate()?;

        let nodes = ledger.nodes()?;
        let Some(node) = nodes.iter().find(|n| n.available_cpus >= request.cpus) else {
            info!(
                user = %request.user_id,
                cpus = request.cpus,
                "no single node has enough free CPUs"
            );
            return Ok(Vec::new());
        };

        debug!(node = %node.id, available = node.available_cpus, "single-node candidate");
        let share = Share {
            node,
            cpus: request.cpus,
            memory_bytes: request.memory_bytes,
        };
        commit_shares(ledger, request, &[share])
    }
}
