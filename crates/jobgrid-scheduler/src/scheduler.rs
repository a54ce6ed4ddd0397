//! Scheduler — ties allocation, job records and worker launches together.
//!
//! The `Scheduler` is the façade callers use to:
//! - Submit a job: validate, allocate under a policy, queue the job's
//!   request ids for its owner, and queue one launch per node share
//! - Drain the launch queue into the orchestration backend
//! - Hand a user back the records of their oldest unclaimed job
//! - Mirror the backend's running workers into the state store

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use jobgrid_core::{NodeConfig, PolicyKind, SchedulerConfig};
use jobgrid_placement::{JobRequest, policy_for};
use jobgrid_state::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::launch::{FailedLaunch, LaunchReport, LaunchTask, worker_name};
use crate::orchestrator::{OrchestrationClient, WorkerSpec};

/// One scheduler instance. Several may share a store (threads or
/// processes); the launch queue belongs to this instance alone.
pub struct Scheduler {
    state: StateStore,
    client: Arc<dyn OrchestrationClient>,
    config: SchedulerConfig,
    /// Launches waiting for the next `launch_queued`.
    launch_queue: Mutex<VecDeque<LaunchTask>>,
}

impl Scheduler {
    /// Create a scheduler. The store's reservation retry budget is taken
    /// from `config.reserve_attempts`.
    pub fn new(state: StateStore, client: Arc<dyn OrchestrationClient>, config: SchedulerConfig) -> Self {
        let state = state.with_reserve_attempts(config.reserve_attempts);
        Self {
            state,
            client,
            config,
            launch_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register the configured inventory. Nodes already in the store keep
    /// their current availability. Returns how many nodes were new.
    pub fn register_inventory(&self, nodes: &[NodeConfig]) -> SchedulerResult<usize> {
        let mut added = 0;
        for (position, node) in nodes.iter().enumerate() {
            let node = Node::new(
                position as u32,
                node.id.clone(),
                node.hostname.clone(),
                node.cpus,
                node.memory_bytes()?,
            );
            if self.state.register_node(&node)? {
                added += 1;
            }
        }
        info!(nodes = nodes.len(), added, "inventory registered");
        Ok(added)
    }

    /// Current inventory, in order.
    pub fn nodes(&self) -> SchedulerResult<Vec<Node>> {
        Ok(self.state.nodes()?)
    }

    /// Allocate a job and queue its launches.
    ///
    /// Returns the request id of the job's first record. Nothing is
    /// launched here; call [`Scheduler::launch_queued`] for that.
    pub async fn submit(
        &self,
        user_id: &str,
        cpus: i64,
        memory_bytes: i64,
        policy: Option<PolicyKind>,
    ) -> SchedulerResult<ReqId> {
        let request = JobRequest::new(user_id, cpus, memory_bytes)?;
        let kind = policy.unwrap_or(self.config.policy);

        let records = policy_for(kind).allocate(&self.state, &request)?;
        let Some(first) = records.first() else {
            info!(user = %user_id, cpus = request.cpus, policy = %kind, "no feasible allocation");
            return Err(SchedulerError::InsufficientResources {
                user_id: request.user_id,
                cpus: request.cpus,
                memory_bytes: request.memory_bytes,
            });
        };
        let job_id = first.req_id;

        let req_ids: Vec<ReqId> = records.iter().map(|r| r.req_id).collect();
        self.state.enqueue_job(user_id, &req_ids)?;

        let mut queue = self.launch_queue.lock().await;
        for record in records {
            queue.push_back(self.launch_task(record));
        }

        info!(
            user = %user_id,
            req_id = job_id,
            policy = %kind,
            nodes = req_ids.len(),
            pending_launches = queue.len(),
            "job submitted"
        );
        Ok(job_id)
    }

    /// Launches waiting in this instance's queue.
    pub async fn pending_launches(&self) -> usize {
        self.launch_queue.lock().await.len()
    }

    /// Drain the launch queue, starting each worker as its own task.
    ///
    /// Failures are collected in the report and logged. Their reservations
    /// stay in place.
    pub async fn launch_queued(&self) -> LaunchReport {
        let tasks: Vec<LaunchTask> = self.launch_queue.lock().await.drain(..).collect();
        if tasks.is_empty() {
            return LaunchReport::default();
        }

        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            let client = Arc::clone(&self.client);
            let worker = task.spec.name.clone();
            let req_id = task.record.req_id;
            let host = task.spec.node_constraint.clone();
            let handle = tokio::spawn(async move { client.create_worker(&task.spec).await });
            pending.push((worker, req_id, host, handle));
        }

        let mut report = LaunchReport::default();
        for (worker, req_id, host, handle) in pending {
            let reason = match handle.await {
                Ok(Ok(launched)) => {
                    debug!(worker = %launched.name, host = %launched.host_node, "worker launched");
                    report.launched.push(launched);
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(join) => format!("launch task aborted: {join}"),
            };
            warn!(worker = %worker, req_id, host = %host, reason = %reason, "worker launch failed");
            report.failed.push(FailedLaunch {
                worker,
                req_id,
                host,
                reason,
            });
        }

        info!(
            launched = report.launched.len(),
            failed = report.failed.len(),
            "launch queue drained"
        );
        report
    }

    /// Records of the user's oldest unclaimed job; empty when none is queued.
    pub fn retrieve(&self, user_id: &str) -> SchedulerResult<Vec<AllocationRecord>> {
        Ok(self.state.retrieve_job_metadata(user_id)?)
    }

    /// Workers the backend runs under this scheduler's basename. The
    /// snapshot is also written to the store.
    pub async fn list_running(&self) -> SchedulerResult<Vec<WorkerStatus>> {
        // Trailing dash so "worker" does not also match "worker2-…".
        let prefix = format!("{}-", self.config.worker_basename);
        let workers = self.client.list_workers(&prefix).await?;
        self.state.put_worker_snapshot(&workers)?;
        debug!(workers = workers.len(), "worker snapshot mirrored");
        Ok(workers)
    }

    /// Give a record's CPUs and memory back to its node.
    pub fn release(&self, req_id: ReqId) -> SchedulerResult<Option<AllocationRecord>> {
        let released = self.state.release(req_id)?;
        if released.is_none() {
            warn!(req_id, "release of unknown request id");
        }
        Ok(released)
    }

    fn launch_task(&self, record: AllocationRecord) -> LaunchTask {
        let spec = WorkerSpec {
            node_constraint: record.hostname.clone(),
            cpus: record.cpus_allocated,
            name: worker_name(&self.config.worker_basename, record.index, record.req_id),
            mount: self.config.mount.clone(),
            network: self.config.network.clone(),
        };
        LaunchTask { record, spec }
    }
}
