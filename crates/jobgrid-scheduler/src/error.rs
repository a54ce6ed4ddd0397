//! Scheduler error types.

use jobgrid_core::ConfigError;
use jobgrid_placement::PlacementError;
use jobgrid_state::{AllocationRecord, ReqId, StateError};
use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("insufficient resources for {user_id}: {cpus} CPUs, {memory_bytes} bytes")]
    InsufficientResources {
        user_id: String,
        cpus: u32,
        memory_bytes: u64,
    },

    /// Reservation on `node_id` kept losing races. `committed` stays reserved.
    #[error("allocation conflict on node {node_id} ({} reservation(s) left in place)", .committed.len())]
    AllocationConflict {
        node_id: String,
        committed: Vec<AllocationRecord>,
    },

    #[error("partial allocation: node {node_id} ran out of capacity ({} reservation(s) left in place)", .committed.len())]
    PartialAllocation {
        node_id: String,
        committed: Vec<AllocationRecord>,
    },

    #[error("failed to launch worker {worker} for request {req_id}: {reason}")]
    LaunchFailure {
        worker: String,
        req_id: ReqId,
        reason: String,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("orchestration error: {0}")]
    Orchestration(#[from] anyhow::Error),
}

impl From<PlacementError> for SchedulerError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::InvalidRequest(msg) => SchedulerError::InvalidRequest(msg),
            PlacementError::AllocationConflict { node_id, committed } => {
                SchedulerError::AllocationConflict { node_id, committed }
            }
            PlacementError::PartialAllocation { node_id, committed } => {
                SchedulerError::PartialAllocation { node_id, committed }
            }
            PlacementError::State(e) => SchedulerError::State(e),
        }
    }
}

impl SchedulerError {
    /// Reservations that were committed before the error and were not
    /// rolled back. Release them with [`crate::Scheduler::release`].
    pub fn stranded(&self) -> &[AllocationRecord] {
        match self {
            SchedulerError::AllocationConflict { committed, .. }
            | SchedulerError::PartialAllocation { committed, .. } => committed,
            _ => &[],
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(req_id: ReqId) -> AllocationRecord {
        AllocationRecord {
            req_id,
            user_id: "alice".to_string(),
            node_id: "a".to_string(),
            hostname: "host-a".to_string(),
            cpus_allocated: 2,
            memory_allocated: 0,
            index: 0,
            job_id: req_id,
        }
    }

    #[test]
    fn placement_errors_keep_their_meaning() {
        let err: SchedulerError = PlacementError::InvalidRequest("cpus".to_string()).into();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));

        let err: SchedulerError = PlacementError::PartialAllocation {
            node_id: "b".to_string(),
            committed: vec![record(1)],
        }
        .into();
        assert!(matches!(err, SchedulerError::PartialAllocation { .. }));
        assert_eq!(err.stranded(), &[record(1)]);
        assert!(err.to_string().contains("node b"));
    }

    #[test]
    fn state_errors_pass_through() {
        let err: SchedulerError = PlacementError::State(StateError::NotFound("x".to_string())).into();
        assert!(matches!(err, SchedulerError::State(StateError::NotFound(_))));
        assert!(err.stranded().is_empty());
    }
}
