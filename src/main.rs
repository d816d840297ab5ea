use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::sleep;

use election_timer::raft::NodeRole;
use election_timer::{CandidacyNotice, Config, RaftNode};

#[derive(Parser)]
#[command(name = "election-node")]
#[command(about = "Runs the election-timeout core of a single Raft node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a node and log every election it triggers
    Run {
        /// JSON config file; flags below override its values
        #[arg(short, long)]
        config: Option<String>,

        /// Unique ID for this node
        #[arg(short, long)]
        id: Option<String>,

        /// Lower bound of the election timeout in milliseconds
        #[arg(long)]
        min_ms: Option<u64>,

        /// Upper bound of the election timeout in milliseconds
        #[arg(long)]
        max_ms: Option<u64>,

        /// Interval between timer checks in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Seed for the timeout jitter (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Term restored from persistent state
        #[arg(long, default_value_t = 0)]
        initial_term: u64,

        /// Treat every candidacy as won (a cluster of one)
        #[arg(long)]
        single_node: bool,

        /// Simulate heartbeats from a leader in the current term every N milliseconds
        #[arg(long)]
        heartbeat_ms: Option<u64>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        run_for_secs: Option<u64>,
    },

    /// Load and validate a config file, then print the effective settings
    CheckConfig {
        #[arg(short, long)]
        config: String,
    },
}

fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .try_init();
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("failed to load config from '{path}'"))
        }
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            config.validate().context("invalid election configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Run {
            config,
            id,
            min_ms,
            max_ms,
            poll_ms,
            seed,
            initial_term,
            single_node,
            heartbeat_ms,
            run_for_secs,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(id) = id {
                config.raft.node_id = id;
            }
            if let Some(min_ms) = min_ms {
                config.raft.election_timeout_min = min_ms;
            }
            if let Some(max_ms) = max_ms {
                config.raft.election_timeout_max = max_ms;
            }
            if let Some(poll_ms) = poll_ms {
                config.raft.poll_interval = poll_ms;
            }
            if seed.is_some() {
                config.raft.seed = seed;
            }

            init_logging(&config.log_level);

            run_node(
                config,
                initial_term,
                single_node,
                heartbeat_ms.map(Duration::from_millis),
                run_for_secs.map(Duration::from_secs),
            )
            .await?;
        }
    }

    Ok(())
}

async fn run_node(
    config: Config,
    initial_term: u64,
    single_node: bool,
    heartbeat: Option<Duration>,
    run_for: Option<Duration>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<CandidacyNotice>();
    let node = RaftNode::builder(config.raft.clone())
        .initial_term(initial_term)
        .build(tx)
        .context("invalid election configuration")?;

    info!("Starting node {}", node.id());
    let _timer = node.start()?;

    if let Some(every) = heartbeat {
        let leader = node.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let snap = leader.snapshot();
                if snap.role != NodeRole::Leader {
                    leader.record_heartbeat(snap.term);
                }
            }
        });
    }

    let deadline = async {
        match run_for {
            Some(d) => sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut elections = 0u64;
    loop {
        tokio::select! {
            Some(notice) = rx.recv() => {
                elections += 1;
                info!("Candidacy declared for term {}", notice.term);
                if single_node {
                    if let Err(e) = node.become_leader(notice.term) {
                        warn!("Could not take leadership for term {}: {e}", notice.term);
                    }
                }
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let snap = node.snapshot();
    info!(
        "Stopping node {}: term {}, role {}, {elections} election(s)",
        node.id(),
        snap.term,
        snap.role
    );
    Ok(())
}
