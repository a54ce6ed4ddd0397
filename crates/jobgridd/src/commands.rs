use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use jobgrid_core::{JobgridConfig, PolicyKind, parse_memory};
use jobgrid_scheduler::{InMemoryOrchestrator, Scheduler};
use jobgrid_state::{AllocationRecord, StateStore};
use tracing::info;

/// Global flags shared by every subcommand.
pub struct CliContext {
    pub config_path: PathBuf,
    pub store_override: Option<PathBuf>,
}

impl CliContext {
    fn load_config(&self) -> anyhow::Result<JobgridConfig> {
        JobgridConfig::from_file(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path.display()))
    }

    fn store_path(&self, config: &JobgridConfig) -> PathBuf {
        self.store_override
            .clone()
            .unwrap_or_else(|| config.store.path.clone())
    }

    /// Open the store and build a scheduler over the configured inventory.
    fn open_scheduler(&self) -> anyhow::Result<(Scheduler, usize)> {
        let config = self.load_config()?;
        let store = open_store(&self.store_path(&config))?;
        let scheduler = Scheduler::new(store, Arc::new(InMemoryOrchestrator::new()), config.scheduler);
        let added = scheduler
            .register_inventory(&config.nodes)
            .context("registering node inventory")?;
        Ok((scheduler, added))
    }
}

fn open_store(path: &Path) -> anyhow::Result<StateStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating store directory {}", parent.display()))?;
    }
    let store = StateStore::open(path).with_context(|| format!("opening store {}", path.display()))?;
    info!(path = %path.display(), "state store opened");
    Ok(store)
}

/// Accepts raw integers (negative ones are rejected by the scheduler) and
/// suffixed sizes.
fn memory_arg(value: &str) -> anyhow::Result<i64> {
    if let Ok(bytes) = value.trim().parse::<i64>() {
        return Ok(bytes);
    }
    let Some(bytes) = parse_memory(value) else {
        bail!("invalid memory size '{value}'");
    };
    i64::try_from(bytes).with_context(|| format!("memory size '{value}' is too large"))
}

pub fn scaffold_config(nodes: usize, cpus: u32, memory: &str) -> anyhow::Result<()> {
    let config = JobgridConfig::scaffold(nodes, cpus, memory);
    config.validate().context("scaffolded config is invalid")?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

pub fn init(ctx: &CliContext) -> anyhow::Result<()> {
    let (scheduler, added) = ctx.open_scheduler()?;
    let total = scheduler.nodes()?.len();
    println!("✓ {total} node(s) in inventory, {added} newly registered");
    Ok(())
}

pub fn nodes(ctx: &CliContext, format: &str) -> anyhow::Result<()> {
    let (scheduler, _) = ctx.open_scheduler()?;
    let nodes = scheduler.nodes()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&nodes)?),
        _ => {
            println!(
                "{:<12} {:<12} {:>10} {:>20}",
                "NODE", "HOST", "CPUS", "MEMORY (bytes)"
            );
            for n in &nodes {
                println!(
                    "{:<12} {:<12} {:>10} {:>20}",
                    n.id,
                    n.hostname,
                    format!("{}/{}", n.available_cpus, n.total_cpus),
                    format!("{}/{}", n.available_memory_bytes, n.total_memory_bytes),
                );
            }
        }
    }
    Ok(())
}

pub async fn submit(
    ctx: &CliContext,
    user: &str,
    cpus: i64,
    memory: &str,
    policy: Option<PolicyKind>,
    launch: bool,
) -> anyhow::Result<()> {
    let memory_bytes = memory_arg(memory)?;
    let (scheduler, _) = ctx.open_scheduler()?;

    let req_id = match scheduler.submit(user, cpus, memory_bytes, policy).await {
        Ok(req_id) => req_id,
        Err(err) => {
            let stranded = err.stranded();
            if !stranded.is_empty() {
                println!("✗ job not placed; these reservations are still held (free with `jobgridd release <REQ>`):");
                print_records(stranded);
            }
            return Err(err.into());
        }
    };
    println!("✓ submitted job {req_id} for {user}");

    if !launch {
        println!("  {} launch(es) not started (--no-launch)", scheduler.pending_launches().await);
        return Ok(());
    }

    let report = scheduler.launch_queued().await;
    for worker in &report.launched {
        println!("  started {} on {}", worker.name, worker.host_node);
    }
    for failure in &report.failed {
        println!("  ✗ {} on {}: {}", failure.worker, failure.host, failure.reason);
    }
    scheduler.list_running().await?;
    report.into_result()?;
    Ok(())
}

pub fn retrieve(ctx: &CliContext, user: &str, format: &str) -> anyhow::Result<()> {
    let (scheduler, _) = ctx.open_scheduler()?;
    let records = scheduler.retrieve(user)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ if records.is_empty() => println!("no queued jobs for {user}"),
        _ => print_records(&records),
    }
    Ok(())
}

fn print_records(records: &[AllocationRecord]) {
    print!("{}", render_records(records));
}

fn render_records(records: &[AllocationRecord]) -> String {
    let mut out = format!(
        "{:>8} {:>5} {:<12} {:<12} {:>6} {:>16}\n",
        "REQ", "INDEX", "NODE", "HOST", "CPUS", "MEMORY"
    );
    for r in records {
        out.push_str(&format!(
            "{:>8} {:>5} {:<12} {:<12} {:>6} {:>16}\n",
            r.req_id, r.index, r.node_id, r.hostname, r.cpus_allocated, r.memory_allocated
        ));
    }
    out
}

pub fn release(ctx: &CliContext, req_id: u64) -> anyhow::Result<()> {
    let (scheduler, _) = ctx.open_scheduler()?;
    match scheduler.release(req_id)? {
        Some(r) => println!(
            "✓ released request {req_id}: {} CPUs, {} bytes back to {}",
            r.cpus_allocated, r.memory_allocated, r.node_id
        ),
        None => println!("request {req_id} has no allocation to release"),
    }
    Ok(())
}

pub fn workers(ctx: &CliContext, format: &str) -> anyhow::Result<()> {
    let (scheduler, _) = ctx.open_scheduler()?;
    let workers = scheduler.state().list_worker_snapshot()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&workers)?),
        _ => {
            println!("{:<32} {:<12} {:>6}", "WORKER", "HOST", "CPUS");
            for w in &workers {
                println!("{:<32} {:<12} {:>6}", w.name, w.host_node, w.cpus_allocated);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_arg_accepts_bytes_and_sizes() {
        assert_eq!(memory_arg("1024").unwrap(), 1024);
        assert_eq!(memory_arg("-5").unwrap(), -5);
        assert_eq!(memory_arg("2GiB").unwrap(), 2 << 30);
        assert!(memory_arg("lots").is_err());
    }

    #[test]
    fn open_scheduler_registers_inventory_once() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("jobgrid.toml");
        let store_path = dir.path().join("state").join("jobgrid.redb");
        let config = JobgridConfig::scaffold(2, 8, "1GiB");
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let ctx = CliContext {
            config_path,
            store_override: Some(store_path.clone()),
        };
        let (scheduler, added) = ctx.open_scheduler().unwrap();
        assert_eq!(added, 2);
        drop(scheduler);

        let (scheduler, added) = ctx.open_scheduler().unwrap();
        assert_eq!(added, 0);
        assert_eq!(scheduler.nodes().unwrap().len(), 2);
        assert!(store_path.exists());
    }

    #[test]
    fn stranded_records_render_with_request_ids() {
        let err = jobgrid_scheduler::SchedulerError::PartialAllocation {
            node_id: "node-2".to_string(),
            committed: vec![AllocationRecord {
                req_id: 41,
                user_id: "alice".to_string(),
                node_id: "node-1".to_string(),
                hostname: "host01".to_string(),
                cpus_allocated: 8,
                memory_allocated: 1000,
                index: 0,
                job_id: 41,
            }],
        };

        let table = render_records(err.stranded());
        let row = table.lines().nth(1).unwrap();
        assert!(row.trim_start().starts_with("41"));
        assert!(row.contains("node-1"));
        assert!(row.contains(" 8 "));
    }

    #[test]
    fn missing_config_is_reported_with_path() {
        let ctx = CliContext {
            config_path: PathBuf::from("/nonexistent/jobgrid.toml"),
            store_override: None,
        };
        let err = ctx.open_scheduler().err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/jobgrid.toml"));
    }
}
