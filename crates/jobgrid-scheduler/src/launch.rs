//! Launch tasks and the report produced when they are drained.

use jobgrid_state::{AllocationRecord, ReqId};
use serde::Serialize;

use crate::error::{SchedulerError, SchedulerResult};
use crate::orchestrator::{WorkerHandle, WorkerSpec};

/// Worker name for the `index`-th node of request `req_id`.
pub fn worker_name(basename: &str, index: u32, req_id: ReqId) -> String {
    format!("{basename}-{index}-{req_id}")
}

/// One pending worker launch, queued at submit time.
#[derive(Debug, Clone)]
pub struct LaunchTask {
    pub record: AllocationRecord,
    pub spec: WorkerSpec,
}

/// A launch that did not produce a worker. The reservation behind it is
/// still held.
#[derive(Debug, Clone, Serialize)]
pub struct FailedLaunch {
    pub worker: String,
    pub req_id: ReqId,
    pub host: String,
    pub reason: String,
}

/// Outcome of one `launch_queued` drain.
#[derive(Debug, Default, Serialize)]
pub struct LaunchReport {
    pub launched: Vec<WorkerHandle>,
    pub failed: Vec<FailedLaunch>,
}

impl LaunchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// The launched workers, or the first failure as an error.
    pub fn into_result(self) -> SchedulerResult<Vec<WorkerHandle>> {
        match self.failed.into_iter().next() {
            Some(f) => Err(SchedulerError::LaunchFailure {
                worker: f.worker,
                req_id: f.req_id,
                reason: f.reason,
            }),
            None => Ok(self.launched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_name_format() {
        assert_eq!(worker_name("worker", 0, 17), "worker-0-17");
        assert_eq!(worker_name("ray", 2, 5), "ray-2-5");
    }

    #[test]
    fn clean_report_yields_handles() {
        let report = LaunchReport {
            launched: vec![WorkerHandle {
                name: "worker-0-1".to_string(),
                host_node: "gpu01".to_string(),
            }],
            failed: vec![],
        };
        assert!(report.is_clean());
        assert_eq!(report.into_result().unwrap().len(), 1);
    }

    #[test]
    fn failure_becomes_launch_error() {
        let report = LaunchReport {
            launched: vec![],
            failed: vec![FailedLaunch {
                worker: "worker-1-2".to_string(),
                req_id: 2,
                host: "gpu02".to_string(),
                reason: "refused".to_string(),
            }],
        };
        assert!(!report.is_clean());
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, SchedulerError::LaunchFailure { req_id: 2, .. }));
    }

    #[test]
    fn report_serializes_for_cli_output() {
        let report = LaunchReport::default();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["launched"], serde_json::json!([]));
    }
}
