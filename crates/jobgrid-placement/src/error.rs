//! Placement error types.

use jobgrid_state::{AllocationRecord, StateError};
use thiserror::Error;

/// Errors that can occur while allocating a request.
///
/// "No feasible allocation" is not an error: policies return an empty list.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A commit kept losing races on `node_id`. Records in `committed` were
    /// already written for earlier nodes and are not rolled back.
    #[error("allocation conflict on node {node_id} ({} earlier reservation(s) kept)", .committed.len())]
    AllocationConflict {
        node_id: String,
        committed: Vec<AllocationRecord>,
    },

    /// Capacity on `node_id` disappeared after earlier nodes were committed.
    #[error("partial allocation: node {node_id} ran out of capacity ({} earlier reservation(s) kept)", .committed.len())]
    PartialAllocation {
        node_id: String,
        committed: Vec<AllocationRecord>,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl PlacementError {
    /// Records that were committed before the failure, if any.
    pub fn committed(&self) -> &[AllocationRecord] {
        match self {
            PlacementError::AllocationConflict { committed, .. }
            | PlacementError::PartialAllocation { committed, .. } => committed,
            _ => &[],
        }
    }
}

pub type PlacementResult<T> = Result<T, PlacementError>;
