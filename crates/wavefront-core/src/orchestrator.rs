use crate::error::{Result, WavefrontError};
use crate::events::{Event, EventBus};
use crate::executor::{self, PoolConfig};
use crate::planner::{self, Unschedulable, Wave};
use crate::review::{self, Review, ReviewOutcome, ReviewSummary};
use crate::ticket::{self, Ticket};
use crate::tools::git::{GitTool, Identity};
use crate::types::TicketStatus;
use crate::work::{WorkResult, Worker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Repository every sandbox is copied from.
    pub repo_root: PathBuf,
    /// Objective line surfaced in reviews and the terminal summary.
    pub objective: Option<String>,
    /// Worker pool bound.
    pub max_workers: usize,
    /// Commit successful work through the version-control adapter.
    pub autonomous: bool,
    /// Author identity for autonomous commits.
    pub author: Identity,
    /// Ceiling on planning passes; follow-up injection re-enters planning,
    /// so a cascade of follow-ups always terminates.
    pub max_rounds: usize,
}

impl OrchestratorConfig {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            objective: None,
            max_workers: 4,
            autonomous: true,
            author: Identity::new("wavefront", "wavefront@localhost"),
            max_rounds: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Success,
    Failed,
}

/// Integration is a pass-through counter over approved results; conflict
/// resolution is out of scope.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationReport {
    pub patches_applied: usize,
    pub conflicts: usize,
    pub tests_passed: bool,
    pub status: IntegrationStatus,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TicketTotals {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub objective: Option<String>,
    pub repository: PathBuf,
    pub tickets: TicketTotals,
    pub review: ReviewSummary,
    pub integration: IntegrationReport,
    pub unschedulable: Vec<Unschedulable>,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionSummary {
    /// Human-readable terminal report.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "=".repeat(60),
            "WAVEFRONT EXECUTION SUMMARY".to_string(),
            "=".repeat(60),
        ];
        if let Some(objective) = &self.objective {
            lines.push(format!("Objective:     {objective}"));
        }
        lines.push(format!(
            "Tickets:       {}/{} completed, {} failed, {} pending",
            self.tickets.completed, self.tickets.total, self.tickets.failed, self.tickets.pending
        ));
        lines.push(format!(
            "Reviews:       {}/{} approved ({:.1}%), avg alignment {:.2}",
            self.review.approved,
            self.review.total,
            self.review.approval_rate * 100.0,
            self.review.average_alignment_score
        ));
        lines.push(format!(
            "Integration:   {} ({} patch(es) applied)",
            match self.integration.status {
                IntegrationStatus::Success => "success",
                IntegrationStatus::Failed => "failed",
            },
            self.integration.patches_applied
        ));
        if !self.unschedulable.is_empty() {
            let ids: Vec<&str> = self
                .unschedulable
                .iter()
                .map(|u| u.ticket_id.as_str())
                .collect();
            lines.push(format!("Unschedulable: {}", ids.join(", ")));
        }
        lines.push(format!(
            "Overall:       {}",
            if self.success { "SUCCESS" } else { "NEEDS WORK" }
        ));
        lines.push("=".repeat(60));
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the live ticket set and the result/review maps. All mutation happens
/// on the orchestrator's task; workers communicate exclusively through
/// returned values and the event bus.
pub struct Orchestrator {
    config: OrchestratorConfig,
    tickets: Vec<Ticket>,
    results: HashMap<String, WorkResult>,
    reviews: HashMap<String, ReviewOutcome>,
    events: EventBus,
    stop: Arc<AtomicBool>,
    worker: Arc<dyn Worker>,
    reviewer: Arc<dyn Review>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Orchestrator { .. }")
    }
}

impl Orchestrator {
    /// Fails fast on a nonexistent repository root, the only fatal
    /// configuration error; everything downstream is converted to data.
    pub fn new(
        config: OrchestratorConfig,
        worker: Arc<dyn Worker>,
        reviewer: Arc<dyn Review>,
    ) -> Result<Self> {
        if !config.repo_root.is_dir() {
            return Err(WavefrontError::InvalidRoot(config.repo_root.clone()));
        }
        Ok(Self {
            config,
            tickets: Vec::new(),
            results: HashMap::new(),
            reviews: HashMap::new(),
            events: EventBus::default(),
            stop: Arc::new(AtomicBool::new(false)),
            worker,
            reviewer,
        })
    }

    /// Ingest tickets from the decomposition collaborator. Ids must be
    /// non-empty and unique across the live set.
    pub fn load_tickets(&mut self, tickets: Vec<Ticket>) -> Result<()> {
        for t in &tickets {
            if t.id.trim().is_empty() {
                return Err(WavefrontError::EmptyTicketId);
            }
            if ticket::find(&self.tickets, &t.id).is_some()
                || tickets.iter().filter(|o| o.id == t.id).count() > 1
            {
                return Err(WavefrontError::DuplicateTicket(t.id.clone()));
            }
        }
        self.tickets.extend(tickets);
        Ok(())
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn results(&self) -> &HashMap<String, WorkResult> {
        &self.results
    }

    pub fn reviews(&self) -> &HashMap<String, ReviewOutcome> {
        &self.reviews
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Cooperative cancellation: checked before each wave; in-flight tickets
    /// run to completion.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        tracing::info!("stop requested");
    }

    /// Run the full pipeline: plan, execute wave by wave, review as results
    /// land, re-plan for injected follow-ups, then integrate and summarize.
    pub async fn execute(&mut self) -> Result<ExecutionSummary> {
        tracing::info!(
            repository = %self.config.repo_root.display(),
            tickets = self.tickets.len(),
            max_workers = self.config.max_workers,
            "execution started"
        );
        let pool = PoolConfig {
            max_workers: self.config.max_workers,
            source_root: self.config.repo_root.clone(),
        };

        let mut stopped = false;
        for round in 1..=self.config.max_rounds {
            let plan = planner::plan(&self.tickets);
            if !plan.unschedulable.is_empty() {
                tracing::warn!(
                    count = plan.unschedulable.len(),
                    "unschedulable tickets in plan"
                );
                self.events.emit(Event::Unschedulable {
                    entries: plan.unschedulable.clone(),
                });
            }
            if plan.waves.is_empty() {
                break;
            }
            tracing::info!(round, waves = plan.waves.len(), "planned execution waves");

            for wave in &plan.waves {
                if self.stop.load(Ordering::Relaxed) {
                    tracing::info!(wave = wave.number, "stopped before wave");
                    stopped = true;
                    break;
                }
                self.run_wave(wave, &pool).await?;
            }
            if stopped {
                break;
            }
            if round == self.config.max_rounds && !planner::plan(&self.tickets).waves.is_empty() {
                tracing::warn!(
                    max_rounds = self.config.max_rounds,
                    "planning round limit reached with schedulable work remaining"
                );
            }
        }

        let residue = planner::plan(&self.tickets).unschedulable;
        let integration = self.integrate();
        let summary = self.summarize(residue, integration);
        tracing::info!(success = summary.success, "execution complete");
        Ok(summary)
    }

    async fn run_wave(&mut self, wave: &Wave, pool: &PoolConfig) -> Result<()> {
        tracing::info!(
            wave = wave.number,
            tickets = wave.ticket_ids.len(),
            "executing wave"
        );
        self.events.emit(Event::WaveStarted {
            wave: wave.number,
            ticket_ids: wave.ticket_ids.clone(),
        });

        let mut batch = Vec::with_capacity(wave.ticket_ids.len());
        for id in &wave.ticket_ids {
            self.set_status(id, TicketStatus::InProgress)?;
            let t = ticket::find(&self.tickets, id)
                .ok_or_else(|| WavefrontError::TicketNotFound(id.clone()))?
                .clone();
            batch.push(t);
        }

        let outcomes = executor::execute_wave(batch, self.worker.clone(), pool, &self.events).await;
        // Completion order, one entry per ticket.
        for (updated, result) in outcomes {
            self.absorb(updated, result).await?;
        }

        self.events.emit(Event::WaveFinished { wave: wave.number });
        Ok(())
    }

    /// Merge the worker's ticket back, transition status, attempt the
    /// autonomous post-step, then pass the result through the review gate.
    async fn absorb(&mut self, updated: Ticket, result: WorkResult) -> Result<()> {
        let id = updated.id.clone();
        {
            let slot = ticket::find_mut(&mut self.tickets, &id)?;
            slot.acceptance_criteria = updated.acceptance_criteria;
            slot.assigned_worker = updated.assigned_worker;
        }

        let success = result.success;
        self.set_status(
            &id,
            if success {
                TicketStatus::NeedsReview
            } else {
                TicketStatus::Failed
            },
        )?;
        if success {
            tracing::info!(ticket = %id, "execution finished");
            if self.config.autonomous {
                self.commit_ticket(&id).await;
            }
        } else {
            tracing::warn!(
                ticket = %id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "execution failed"
            );
        }
        self.events.emit(Event::ResultReady {
            result: result.clone(),
        });

        let outcome = {
            let t = ticket::find(&self.tickets, &id)
                .ok_or_else(|| WavefrontError::TicketNotFound(id.clone()))?;
            self.reviewer.review(t, &result)
        };
        self.apply_review(&outcome)?;

        self.results.insert(id.clone(), result);
        self.reviews.insert(id, outcome);
        Ok(())
    }

    /// Approved tickets complete; rejected tickets fail. Retry is a new
    /// ticket, never a mutation of the old one. Follow-ups join the live set
    /// and enter the next planning pass.
    fn apply_review(&mut self, outcome: &ReviewOutcome) -> Result<()> {
        let status = if outcome.approved {
            TicketStatus::Completed
        } else {
            TicketStatus::Failed
        };
        self.set_status(&outcome.ticket_id, status)?;
        self.events.emit(Event::Reviewed {
            outcome: outcome.clone(),
        });

        for fu in &outcome.follow_up_tickets {
            if ticket::find(&self.tickets, &fu.id).is_some() {
                tracing::warn!(ticket = %fu.id, "follow-up id already present, skipping");
                continue;
            }
            tracing::info!(parent = %outcome.ticket_id, ticket = %fu.id, "follow-up injected");
            self.tickets.push(fu.clone());
        }
        Ok(())
    }

    fn set_status(&mut self, id: &str, status: TicketStatus) -> Result<()> {
        ticket::set_status(&mut self.tickets, id, status)?;
        self.events.emit(Event::StatusChange {
            ticket_id: id.to_string(),
            status,
        });
        Ok(())
    }

    /// Post-step after a successful execution: commit through the adapter
    /// with the configured identity. Failure is logged, never fatal.
    async fn commit_ticket(&mut self, id: &str) {
        let title = ticket::find(&self.tickets, id)
            .map(|t| t.title.clone())
            .unwrap_or_default();
        let mut git = GitTool::new(&self.config.repo_root);
        let out = git
            .commit_all(&format!("{id}: {title}"), &self.config.author)
            .await;
        if out.success {
            tracing::info!(ticket = %id, "changes committed");
        } else {
            tracing::warn!(
                ticket = %id,
                error = %out.error.map(|f| f.message).unwrap_or_default(),
                "commit failed"
            );
        }
    }

    fn integrate(&self) -> IntegrationReport {
        let approved = self.reviews.values().filter(|r| r.approved).count();
        tracing::info!(patches = approved, "integrating approved changes");
        IntegrationReport {
            patches_applied: approved,
            conflicts: 0,
            tests_passed: true,
            status: IntegrationStatus::Success,
        }
    }

    fn summarize(
        &self,
        unschedulable: Vec<Unschedulable>,
        integration: IntegrationReport,
    ) -> ExecutionSummary {
        let review = review::summarize(self.reviews.values());
        let counts = ticket::status_counts(&self.tickets);
        let success =
            integration.status == IntegrationStatus::Success && review.approval_rate >= 0.8;
        ExecutionSummary {
            objective: self.config.objective.clone(),
            repository: self.config.repo_root.clone(),
            tickets: TicketTotals {
                total: counts.total,
                completed: counts.completed,
                failed: counts.failed,
                pending: counts.pending,
            },
            review,
            integration,
            unschedulable,
            success,
            completed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
