use crate::output;
use crate::worker::CommandWorker;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wavefront_core::events::Event;
use wavefront_core::manifest::RunManifest;
use wavefront_core::orchestrator::{Orchestrator, OrchestratorConfig};
use wavefront_core::review::{Review, ReviewGate};
use wavefront_core::tools::git::Identity;

pub struct RunOptions {
    pub max_workers: usize,
    pub user_name: String,
    pub user_email: String,
    pub autonomous: bool,
    pub timeout_secs: u64,
    pub max_rounds: usize,
}

/// Execute a manifest. Returns the overall success flag; the caller maps
/// `false` to a non-zero exit status.
pub fn run(
    root: &Path,
    manifest_path: &Path,
    options: RunOptions,
    json: bool,
) -> anyhow::Result<bool> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(root, manifest_path, options, json))
}

async fn run_async(
    root: &Path,
    manifest_path: &Path,
    options: RunOptions,
    json: bool,
) -> anyhow::Result<bool> {
    let manifest = RunManifest::load(manifest_path)?;
    let tickets = manifest.to_tickets();

    let mut config = OrchestratorConfig::new(root);
    config.objective = manifest.objective.clone();
    config.max_workers = options.max_workers;
    config.autonomous = options.autonomous;
    config.author = Identity::new(options.user_name.clone(), options.user_email.clone());
    config.max_rounds = options.max_rounds;

    let worker = Arc::new(CommandWorker::new(
        root,
        &manifest,
        Duration::from_secs(options.timeout_secs),
    ));
    let reviewer: Arc<dyn Review> = match &manifest.objective {
        Some(objective) => Arc::new(ReviewGate::with_objective(objective.clone())),
        None => Arc::new(ReviewGate::new()),
    };

    let mut orchestrator = Orchestrator::new(config, worker, reviewer)?;
    orchestrator.load_tickets(tickets)?;

    // Progress stream → stdout, unless the caller wants pure JSON.
    let printer = if json {
        None
    } else {
        let mut rx = orchestrator.subscribe();
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(line) = render_event(&event) {
                            println!("{line}");
                        }
                    }
                    // Lagged is recoverable; Closed means the run is over.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    };

    let summary = orchestrator.execute().await?;
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    if json {
        output::print_json(&summary)?;
    } else {
        println!("\n{}", summary.render());
    }
    Ok(summary.success)
}

fn render_event(event: &Event) -> Option<String> {
    match event {
        Event::WaveStarted { wave, ticket_ids } => Some(format!(
            "wave {wave}: {} ticket(s): {}",
            ticket_ids.len(),
            ticket_ids.join(", ")
        )),
        Event::WaveFinished { wave } => Some(format!("wave {wave} complete")),
        Event::StatusChange { ticket_id, status } => Some(format!("  {ticket_id} -> {status}")),
        Event::Progress { message } => Some(format!("  {message}")),
        Event::Reviewed { outcome } => Some(format!(
            "  {} {} (alignment {:.2})",
            outcome.ticket_id,
            if outcome.approved {
                "approved"
            } else {
                "rejected"
            },
            outcome.alignment_score
        )),
        Event::Unschedulable { entries } => {
            let ids: Vec<&str> = entries.iter().map(|e| e.ticket_id.as_str()).collect();
            Some(format!("unschedulable: {}", ids.join(", ")))
        }
        Event::ResultReady { .. } => None,
    }
}
