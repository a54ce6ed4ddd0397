//! The seam to the backend that actually starts worker processes.
//!
//! The scheduler only needs two things from a backend: start a named worker
//! pinned to a host with a CPU budget, and list the workers it is running.
//! Both are async and boxed so the trait stays object-safe and a backend
//! can be swapped behind an `Arc<dyn OrchestrationClient>`.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use anyhow::bail;
use jobgrid_core::MountConfig;
use jobgrid_state::WorkerStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// What the backend reports for a running worker.
pub type WorkerInfo = WorkerStatus;

/// Boxed future returned by [`OrchestrationClient`] methods.
pub type OrchestrationFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Launch instructions for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Hostname the worker must be placed on.
    pub node_constraint: String,
    pub cpus: u32,
    pub name: String,
    pub mount: Option<MountConfig>,
    pub network: String,
}

/// Backend acknowledgement of a started worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub name: String,
    pub host_node: String,
}

/// Starts and lists distributed workers.
pub trait OrchestrationClient: Send + Sync {
    fn create_worker<'a>(&'a self, spec: &'a WorkerSpec) -> OrchestrationFuture<'a, WorkerHandle>;

    /// Workers whose name starts with `name_prefix`.
    fn list_workers<'a>(&'a self, name_prefix: &'a str) -> OrchestrationFuture<'a, Vec<WorkerInfo>>;
}

/// A backend that keeps workers in memory.
///
/// Used by the daemon when no external backend is wired, and by tests.
/// Hosts passed to [`InMemoryOrchestrator::fail_on_host`] reject every
/// launch, and duplicate worker names are rejected like a real backend
/// would.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    workers: Mutex<Vec<WorkerSpec>>,
    failing_hosts: Mutex<HashSet<String>>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch on `hostname` fail from now on.
    pub async fn fail_on_host(&self, hostname: impl Into<String>) {
        self.failing_hosts.lock().await.insert(hostname.into());
    }

    /// Every worker spec accepted so far, in launch order.
    pub async fn launched(&self) -> Vec<WorkerSpec> {
        self.workers.lock().await.clone()
    }
}

impl OrchestrationClient for InMemoryOrchestrator {
    fn create_worker<'a>(&'a self, spec: &'a WorkerSpec) -> OrchestrationFuture<'a, WorkerHandle> {
        Box::pin(async move {
            if self.failing_hosts.lock().await.contains(&spec.node_constraint) {
                bail!("host {} refused worker {}", spec.node_constraint, spec.name);
            }

            let mut workers = self.workers.lock().await;
            if workers.iter().any(|w| w.name == spec.name) {
                bail!("worker {} already exists", spec.name);
            }
            workers.push(spec.clone());
            debug!(worker = %spec.name, host = %spec.node_constraint, cpus = spec.cpus, "worker started");

            Ok(WorkerHandle {
                name: spec.name.clone(),
                host_node: spec.node_constraint.clone(),
            })
        })
    }

    fn list_workers<'a>(&'a self, name_prefix: &'a str) -> OrchestrationFuture<'a, Vec<WorkerInfo>> {
        Box::pin(async move {
            let workers = self.workers.lock().await;
            Ok(workers
                .iter()
                .filter(|w| w.name.starts_with(name_prefix))
                .map(|w| WorkerInfo {
                    name: w.name.clone(),
                    host_node: w.node_constraint.clone(),
                    cpus_allocated: w.cpus,
                })
                .collect())
        })
    }
}
