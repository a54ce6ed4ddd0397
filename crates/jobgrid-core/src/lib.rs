pub mod config;
pub mod types;
pub mod units;

pub use config::{
    ConfigError, JobgridConfig, MemorySpec, MountConfig, NodeConfig, SchedulerConfig, StoreConfig,
};
pub use types::PolicyKind;
pub use units::parse_memory;
