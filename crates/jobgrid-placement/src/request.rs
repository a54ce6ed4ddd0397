//! Job requests as accepted from users.

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// "I need `cpus` CPUs and `memory_bytes` of memory."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub user_id: String,
    pub cpus: u32,
    pub memory_bytes: u64,
}

impl JobRequest {
    /// Build a request from raw signed counts (CLI or wire input).
    ///
    /// Rejects an empty user, `cpus <= 0`, CPU counts that do not fit a
    /// `u32`, and negative memory.
    pub fn new(user_id: impl Into<String>, cpus: i64, memory_bytes: i64) -> PlacementResult<Self> {
        let user_id = user_id.into();
        if cpus <= 0 {
            return Err(PlacementError::InvalidRequest(format!(
                "cpus must be a positive integer, got {cpus}"
            )));
        }
        let cpus = u32::try_from(cpus).map_err(|_| {
            PlacementError::InvalidRequest(format!("cpus {cpus} exceeds the supported range"))
        })?;
        let memory_bytes = u64::try_from(memory_bytes).map_err(|_| {
            PlacementError::InvalidRequest(format!("memory must not be negative, got {memory_bytes}"))
        })?;

        let request = Self {
            user_id,
            cpus,
            memory_bytes,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check invariants that the public fields can still violate.
    pub fn validate(&self) -> PlacementResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(PlacementError::InvalidRequest("user id must not be empty".to_string()));
        }
        if self.cpus == 0 {
            return Err(PlacementError::InvalidRequest(
                "cpus must be a positive integer, got 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_positive_cpus() {
        let req = JobRequest::new("alice", 8, 1024).unwrap();
        assert_eq!(req.cpus, 8);
        assert_eq!(req.memory_bytes, 1024);
    }

    #[test]
    fn accepts_zero_memory() {
        assert!(JobRequest::new("alice", 1, 0).is_ok());
    }

    #[test]
    fn rejects_non_positive_cpus() {
        for cpus in [0, -1, i64::MIN] {
            let err = JobRequest::new("alice", cpus, 0).unwrap_err();
            assert!(matches!(err, PlacementError::InvalidRequest(_)), "cpus={cpus}");
        }
    }

    #[test]
    fn rejects_oversized_cpus_and_negative_memory() {
        assert!(JobRequest::new("alice", i64::from(u32::MAX) + 1, 0).is_err());
        assert!(JobRequest::new("alice", 1, -5).is_err());
    }

    #[test]
    fn rejects_blank_user() {
        assert!(JobRequest::new("  ", 1, 0).is_err());
    }

    #[test]
    fn validate_catches_hand_built_requests() {
        let req = JobRequest {
            user_id: "alice".to_string(),
            cpus: 0,
            memory_bytes: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let req: JobRequest =
            serde_json::from_str(r#"{"user_id":"alice","cpus":4,"memory_bytes":64}"#).unwrap();
        assert_eq!(req, JobRequest::new("alice", 4, 64).unwrap());

        // Fractional CPU counts never make it into a request.
        assert!(serde_json::from_str::<JobRequest>(r#"{"user_id":"a","cpus":2.5,"memory_bytes":0}"#).is_err());
    }
}
