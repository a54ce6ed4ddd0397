//! jobgrid-scheduler — job submission and worker launch orchestration.
//!
//! Sits on top of `jobgrid-placement` and `jobgrid-state`. The scheduler:
//!
//! - Validates requests and allocates them under a chosen policy
//! - Queues each job's request ids for its owner, contiguously
//! - Queues one worker launch per node share and drains them into an
//!   [`OrchestrationClient`] as independent tokio tasks
//! - Reconstructs a user's oldest job from its records on retrieval
//! - Mirrors the backend's running workers into the store
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── StateStore (ledger, counter, records, user queues, worker snapshot)
//!   ├── AllocationPolicy (single_node | round_robin | general_multi_node)
//!   ├── launch queue (owned, drained by launch_queued)
//!   └── Arc<dyn OrchestrationClient>
//! ```

pub mod error;
pub mod launch;
pub mod orchestrator;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use launch::{FailedLaunch, LaunchReport, LaunchTask, worker_name};
pub use orchestrator::{
    InMemoryOrchestrator, OrchestrationClient, OrchestrationFuture, WorkerHandle, WorkerInfo, WorkerSpec,
};
pub use scheduler::Scheduler;
