mod cmd;
mod output;
mod worker;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wavefront",
    about = "Dependency-wave ticket orchestrator: plan and execute parallel work against a repository",
    version,
    propagate_version = true
)]
struct Cli {
    /// Repository root that sandboxes are copied from
    #[arg(long, global = true, env = "WAVEFRONT_ROOT", default_value = ".")]
    root: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dependency wave plan for a run manifest
    Plan {
        /// Path to the run manifest (YAML)
        manifest: PathBuf,
    },

    /// Execute a run manifest against the repository
    Run {
        /// Path to the run manifest (YAML)
        manifest: PathBuf,

        /// Maximum parallel workers
        #[arg(long, default_value_t = 4)]
        max_workers: usize,

        /// Author name for autonomous commits
        #[arg(long, default_value = "wavefront")]
        user_name: String,

        /// Author email for autonomous commits
        #[arg(long, default_value = "wavefront@localhost")]
        user_email: String,

        /// Disable autonomous commits of successful work
        #[arg(long)]
        no_autonomous: bool,

        /// Per-command timeout inside the sandbox, in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Maximum planning passes (follow-ups re-enter planning)
        #[arg(long, default_value_t = 3)]
        max_rounds: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Plan { manifest } => cmd::plan::run(&manifest, cli.json).map(|_| true),
        Commands::Run {
            manifest,
            max_workers,
            user_name,
            user_email,
            no_autonomous,
            timeout_secs,
            max_rounds,
        } => cmd::run::run(
            &cli.root,
            &manifest,
            cmd::run::RunOptions {
                max_workers,
                user_name,
                user_email,
                autonomous: !no_autonomous,
                timeout_secs,
                max_rounds,
            },
            cli.json,
        ),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
