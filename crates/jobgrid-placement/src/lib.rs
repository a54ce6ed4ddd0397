//! jobgrid allocation policies.
//!
//! This crate decides how a CPU/memory request is carved out of the node
//! inventory and commits the result through a [`ResourceLedger`]. It does
//! not queue jobs or launch workers (that's `jobgrid-scheduler`).
//!
//! # Components
//!
//! - **`request`** — validated job requests
//! - **`policy`** — the [`AllocationPolicy`] trait, policy lookup, and the
//!   shared commit loop
//! - **`single_node`**, **`round_robin`**, **`multi_node`** — the strategies
//!
//! [`ResourceLedger`]: jobgrid_state::ResourceLedger

pub mod error;
pub mod multi_node;
pub mod policy;
pub mod request;
pub mod round_robin;
pub mod single_node;

pub use error::{PlacementError, PlacementResult};
pub use multi_node::GeneralMultiNode;
pub use policy::{AllocationPolicy, policy_for, split_memory};
pub use request::JobRequest;
pub use round_robin::{RoundRobin, round_robin_plan};
pub use single_node::SingleNode;
