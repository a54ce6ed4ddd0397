//! jobgridd — command-line front end for the jobgrid scheduler.
//!
//! Wires the pieces together from a `jobgrid.toml`:
//! - State store (redb) at `[store] path`, or `--store`
//! - Node inventory from `[[nodes]]`
//! - Scheduler with the in-memory orchestration backend
//!
//! # Usage
//!
//! ```text
//! jobgridd scaffold-config --nodes 3 --cpus 96 --memory 512GiB > jobgrid.toml
//! jobgridd --config jobgrid.toml init
//! jobgridd --config jobgrid.toml submit --user alice --cpus 10 --memory 8GiB --policy round_robin
//! jobgridd --config jobgrid.toml retrieve --user alice
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jobgrid_core::PolicyKind;
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_FILTER: &str = "info,jobgridd=debug,jobgrid=debug";

#[derive(Parser)]
#[command(
    name = "jobgridd",
    about = "jobgrid — CPU/memory job scheduler over a fixed node inventory",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to jobgrid.toml.
    #[arg(short, long, global = true, default_value = "jobgrid.toml")]
    config: PathBuf,

    /// Override the store path from the config file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a config with `nodes` identical nodes.
    ScaffoldConfig {
        #[arg(long, default_value = "3")]
        nodes: usize,
        #[arg(long, default_value = "96")]
        cpus: u32,
        #[arg(long, default_value = "512GiB")]
        memory: String,
    },
    /// Register the configured inventory in the store. Safe to repeat.
    Init,
    /// Show every node and its remaining capacity.
    Nodes {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Allocate a job, launch its workers, and print the job's request id.
    Submit {
        #[arg(short, long)]
        user: String,
        #[arg(long, allow_negative_numbers = true)]
        cpus: i64,
        /// Bytes, or a size such as 8GiB / 500MB.
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        memory: String,
        /// single_node, round_robin or general_multi_node. Defaults to
        /// `[scheduler] policy`.
        #[arg(short, long)]
        policy: Option<PolicyKind>,
        /// Only allocate and queue; do not start workers.
        #[arg(long)]
        no_launch: bool,
    },
    /// Pop the user's oldest job and print its allocation records.
    Retrieve {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Return one allocation record's resources to its node.
    Release { req_id: u64 },
    /// Show the last mirrored worker snapshot.
    Workers {
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let ctx = commands::CliContext {
        config_path: cli.config,
        store_override: cli.store,
    };

    match cli.command {
        Command::ScaffoldConfig { nodes, cpus, memory } => commands::scaffold_config(nodes, cpus, &memory),
        Command::Init => commands::init(&ctx),
        Command::Nodes { format } => commands::nodes(&ctx, &format),
        Command::Submit {
            user,
            cpus,
            memory,
            policy,
            no_launch,
        } => commands::submit(&ctx, &user, cpus, &memory, policy, !no_launch).await,
        Command::Retrieve { user, format } => commands::retrieve(&ctx, &user, &format),
        Command::Release { req_id } => commands::release(&ctx, req_id),
        Command::Workers { format } => commands::workers(&ctx, &format),
    }
}
