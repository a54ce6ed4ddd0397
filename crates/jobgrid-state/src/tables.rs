//! redb table definitions for the jobgrid state store.
//!
//! The logical keyspace is `resource:<node_id>`, `job_request:<req_id>`,
//! `<user_id>` and `next_request_id`; each namespace gets its own table so
//! the prefixes are dropped from the stored keys.

use redb::TableDefinition;

/// Node resource records keyed by `{node_id}`.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Allocation records keyed by request id.
pub const JOB_REQUESTS: TableDefinition<u64, &[u8]> = TableDefinition::new("job_requests");

/// Per-user FIFO of request ids keyed by `{user_id}`.
pub const USER_QUEUES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_queues");

/// Scalar counters keyed by name.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Last observed worker snapshot keyed by worker name.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Counter cell holding the last request id handed out.
pub const NEXT_REQUEST_ID: &str = "next_request_id";
