//! `dutyvisor` command line.
//!
//! ```text
//! dutyvisor supervise --config workload.toml [--grace-ms 5000] [--poll-ms 500]
//!                     [--channel-dir /dev/shm] [--status-ms 1000]
//! dutyvisor worker --slot 0 --mode heavy --heavy 9000:1000 --light 2000:8000
//!                  [--channel /dev/shm/dutyvisor-<pid>] [--status-ms 1000]
//! ```
//!
//! `worker` is the entry point the supervisor launches; it is not meant to be run by hand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dutyvisor::{
    DutyProfile, FileSource, LogWriter, Mode, ModeProfiles, OsLauncher, Supervisor,
    SupervisorConfig, WorkerArgs, run_worker,
};

#[derive(Debug, Parser)]
#[command(name = "dutyvisor", version, about = "Supervisor for a pool of duty-cycle workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the supervisor.
    Supervise {
        /// Workload document (TOML, or JSON with a .json extension).
        #[arg(short, long, env = "DUTYVISOR_CONFIG")]
        config: PathBuf,
        /// Grace period between TERMINATE and FORCE_KILL.
        #[arg(long, default_value_t = 5000)]
        grace_ms: u64,
        /// Control loop poll interval.
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
        /// Directory of the assignment segment.
        #[arg(long, default_value = "/dev/shm")]
        channel_dir: PathBuf,
        /// Worker status interval.
        #[arg(long, default_value_t = 1000)]
        status_ms: u64,
    },
    /// Run one worker (launched by the supervisor).
    Worker {
        #[arg(long)]
        slot: usize,
        #[arg(long, default_value_t = Mode::Heavy)]
        mode: Mode,
        #[arg(long, default_value_t = DutyProfile::HEAVY)]
        heavy: DutyProfile,
        #[arg(long, default_value_t = DutyProfile::LIGHT)]
        light: DutyProfile,
        #[arg(long)]
        channel: Option<PathBuf>,
        #[arg(long, default_value_t = 1000)]
        status_ms: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Supervise {
            config,
            grace_ms,
            poll_ms,
            channel_dir,
            status_ms,
        } => {
            let cfg = SupervisorConfig {
                grace: Duration::from_millis(grace_ms),
                poll_interval: Duration::from_millis(poll_ms),
                channel_dir,
                status_every: Duration::from_millis(status_ms),
                ..SupervisorConfig::default()
            };
            let launcher = match &cfg.worker_program {
                Some(program) => OsLauncher::new(program),
                None => OsLauncher::current_exe().context("cannot locate own executable")?,
            };
            let sup = Supervisor::new(
                cfg,
                Box::new(FileSource::new(config)),
                Box::new(launcher),
                vec![Arc::new(LogWriter::new())],
            );
            sup.run().await.context("supervisor failed")?;
        }
        Command::Worker {
            slot,
            mode,
            heavy,
            light,
            channel,
            status_ms,
        } => {
            let args = WorkerArgs {
                slot,
                mode,
                profiles: ModeProfiles { heavy, light },
                channel,
                status_every: Duration::from_millis(status_ms),
            };
            run_worker(args).await.context("worker failed")?;
        }
    }
    Ok(())
}
