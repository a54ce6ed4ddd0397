//! jobgrid-state — durable resource ledger and job records for jobgrid.
//!
//! Backed by [redb](https://docs.rs/redb). One `StateStore` holds:
//!
//! - the per-node resource ledger (remaining CPUs / memory), mutated only
//!   through optimistic read-compute-commit reservations
//! - the `next_request_id` counter
//! - one allocation record per (request, node) pair
//! - a FIFO queue of request ids per user
//! - the last worker snapshot reported by the orchestration backend
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and async tasks; several stores opened
//! on the same file from different processes are serialized by redb's
//! single-writer lock.

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub mod error;
pub mod ledger;
pub mod records;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ledger::ResourceLedger;
pub use store::StateStore;
pub use types::*;
