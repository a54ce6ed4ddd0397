//! jobgrid.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PolicyKind;
use crate::units::parse_memory;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobgridConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/jobgrid/jobgrid.redb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Policy used when a submission does not name one.
    pub policy: PolicyKind,
    /// Prefix of every worker name; also the filter for listing workers.
    pub worker_basename: String,
    /// Network the orchestration backend attaches workers to.
    pub network: String,
    /// Optimistic commit attempts per node before giving up.
    pub reserve_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<MountConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            worker_basename: "worker".to_string(),
            network: "jobgrid-net".to_string(),
            reserve_attempts: 2,
            mount: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub hostname: String,
    pub cpus: u32,
    pub memory: MemorySpec,
}

/// Memory capacity given either as raw bytes or a suffixed string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemorySpec {
    Bytes(u64),
    Human(String),
}

impl NodeConfig {
    pub fn memory_bytes(&self) -> Result<u64, ConfigError> {
        match &self.memory {
            MemorySpec::Bytes(b) => Ok(*b),
            MemorySpec::Human(s) => parse_memory(s).ok_or_else(|| {
                ConfigError::Invalid(format!("node {}: bad memory size '{s}'", self.id))
            }),
        }
    }
}

impl JobgridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: JobgridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("node inventory is empty".to_string()));
        }
        if self.scheduler.reserve_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.reserve_attempts must be at least 1".to_string(),
            ));
        }
        if self.scheduler.worker_basename.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler.worker_basename must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ConfigError::Invalid("node id must not be empty".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate node id '{}'", node.id)));
            }
            if node.cpus == 0 {
                return Err(ConfigError::Invalid(format!("node {}: cpus must be > 0", node.id)));
            }
            node.memory_bytes()?;
        }
        Ok(())
    }

    /// Scaffold a config with `count` identical nodes.
    pub fn scaffold(count: usize, cpus: u32, memory: &str) -> Self {
        let nodes = (1..=count)
            .map(|i| NodeConfig {
                id: format!("node-{i}"),
                hostname: format!("host{i:02}"),
                cpus,
                memory: MemorySpec::Human(memory.to_string()),
            })
            .collect();

        JobgridConfig {
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[store]
path = "/tmp/jobgrid.redb"

[scheduler]
policy = "round_robin"
worker_basename = "llm"

[scheduler.mount]
source = "/data"
target = "/mnt/data"

[[nodes]]
id = "node-1"
hostname = "gpu01"
cpus = 96
memory = "512GiB"

[[nodes]]
id = "node-2"
hostname = "gpu02"
cpus = 96
memory = 1073741824
"#;

    #[test]
    fn test_parse_full() {
        let config = JobgridConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/jobgrid.redb"));
        assert_eq!(config.scheduler.policy, PolicyKind::RoundRobin);
        assert_eq!(config.scheduler.worker_basename, "llm");
        assert_eq!(config.scheduler.network, "jobgrid-net");
        assert_eq!(config.scheduler.reserve_attempts, 2);
        assert_eq!(
            config.scheduler.mount,
            Some(MountConfig {
                source: "/data".to_string(),
                target: "/mnt/data".to_string(),
            })
        );
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].memory_bytes().unwrap(), 512 * (1 << 30));
        assert_eq!(config.nodes[1].memory_bytes().unwrap(), 1 << 30);
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let toml_str = r#"
[[nodes]]
id = "n1"
hostname = "h1"
cpus = 4
memory = "8G"
"#;
        let config = JobgridConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.scheduler.policy, PolicyKind::SingleNode);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/jobgrid/jobgrid.redb"));
    }

    #[test]
    fn test_rejects_empty_inventory() {
        let err = JobgridConfig::from_toml_str("[scheduler]\npolicy = \"single_node\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_duplicate_nodes() {
        let toml_str = r#"
[[nodes]]
id = "n1"
hostname = "h1"
cpus = 4
memory = 1

[[nodes]]
id = "n1"
hostname = "h2"
cpus = 4
memory = 1
"#;
        let err = JobgridConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn test_rejects_bad_memory_and_zero_cpus() {
        let bad_mem = "[[nodes]]\nid = \"n1\"\nhostname = \"h\"\ncpus = 4\nmemory = \"lots\"\n";
        assert!(JobgridConfig::from_toml_str(bad_mem).is_err());

        let zero_cpu = "[[nodes]]\nid = \"n1\"\nhostname = \"h\"\ncpus = 0\nmemory = 1\n";
        assert!(JobgridConfig::from_toml_str(zero_cpu).is_err());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let toml_str = "[scheduler]\npolicy = \"best_fit\"\n[[nodes]]\nid = \"n1\"\nhostname = \"h\"\ncpus = 1\nmemory = 1\n";
        assert!(matches!(
            JobgridConfig::from_toml_str(toml_str),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_scaffold_round_trips() {
        let config = JobgridConfig::scaffold(3, 96, "512GiB");
        let rendered = config.to_toml_string().unwrap();
        let parsed = JobgridConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.nodes.len(), 3);
        assert_eq!(parsed.nodes[2].id, "node-3");
        assert_eq!(parsed.nodes[2].hostname, "host03");
    }
}
