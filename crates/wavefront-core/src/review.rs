use crate::ticket::{AcceptanceCriterion, Ticket};
use crate::types::TicketPriority;
use crate::work::WorkResult;
use serde::Serialize;

/// Minimum alignment score for approval.
pub const APPROVAL_THRESHOLD: f64 = 0.70;

/// Flat score contribution when a result carries no test counts at all.
const NO_TESTS_CONTRIBUTION: f64 = 0.15;


// ---------------------------------------------------------------------------
// ReviewOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub ticket_id: String,
    pub approved: bool,
    pub alignment_score: f64,
    pub feedback: String,
    pub follow_up_tickets: Vec<Ticket>,
    pub suggestions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Review contract
// ---------------------------------------------------------------------------

/// The scoring seam: given a ticket and its result, produce a verdict.
/// Supplied by the scoring collaborator; [`ReviewGate`] is the default.
pub trait Review: Send + Sync {
    fn review(&self, ticket: &Ticket, result: &WorkResult) -> ReviewOutcome;
}

// ---------------------------------------------------------------------------
// ReviewGate
// ---------------------------------------------------------------------------

/// Default review gate. Approval requires execution success, every
/// acceptance criterion met, zero failing sub-tests, and an alignment score
/// at or above [`APPROVAL_THRESHOLD`].
#[derive(Debug, Clone, Default)]
pub struct ReviewGate {
    objective: Option<String>,
}

impl ReviewGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objective(objective: impl Into<String>) -> Self {
        Self {
            objective: Some(objective.into()),
        }
    }
}

impl Review for ReviewGate {
    fn review(&self, ticket: &Ticket, result: &WorkResult) -> ReviewOutcome {
        let mut feedback = Vec::new();
        let mut approved = true;

        if !result.success {
            approved = false;
            feedback.push(format!(
                "execution failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }

        let met = ticket.criteria_met();
        let total = ticket.acceptance_criteria.len();
        feedback.push(format!("acceptance criteria: {met}/{total} met"));
        if met < total {
            approved = false;
            let unmet: Vec<&str> = ticket
                .acceptance_criteria
                .iter()
                .filter(|c| !c.met)
                .map(|c| c.description.as_str())
                .collect();
            feedback.push(format!("unmet criteria: {}", unmet.join(", ")));
        }

        if let Some(tc) = &result.test_counts {
            feedback.push(format!("tests: {}/{} passed", tc.passed, tc.total));
            if tc.failed > 0 {
                approved = false;
                feedback.push(format!("{} test(s) failed", tc.failed));
            }
        }

        let score = alignment_score(ticket, result);
        feedback.push(format!("alignment score: {score:.2}"));
        if score < APPROVAL_THRESHOLD {
            approved = false;
            feedback.push("low alignment with the objective".to_string());
        }

        let follow_up_tickets = identify_follow_ups(ticket, result);
        if !follow_up_tickets.is_empty() {
            feedback.push(format!(
                "identified {} follow-up task(s)",
                follow_up_tickets.len()
            ));
        }

        feedback.extend(analyze_diff(&result.diff));

        let verdict = if approved {
            "review passed - ticket approved"
        } else {
            "review failed - needs revision"
        };
        feedback.insert(0, verdict.to_string());
        tracing::info!(ticket = %ticket.id, approved, score, "review complete");

        ReviewOutcome {
            ticket_id: ticket.id.clone(),
            approved,
            alignment_score: score,
            feedback: feedback.join("\n"),
            follow_up_tickets,
            suggestions: self.suggest(result, approved),
        }
    }
}

impl ReviewGate {
    fn suggest(&self, result: &WorkResult, approved: bool) -> Vec<String> {
        let mut suggestions = Vec::new();
        if !approved {
            suggestions.push("review the acceptance criteria and ensure all are met".to_string());
            suggestions.push("check test results and fix any failing tests".to_string());
        }
        if result.execution_time.as_secs() > 300 {
            suggestions
                .push("consider breaking this into smaller tickets for faster execution".to_string());
        }
        if let Some(objective) = &self.objective {
            suggestions.push(format!("ensure changes align with objective: {objective}"));
        }
        suggestions
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Weighted [0,1] measure of how well a result satisfies its ticket:
/// 0.30 for execution success, 0.40 scaled by criteria met, 0.30 scaled by
/// tests passed (flat 0.15 when no test counts exist).
pub fn alignment_score(ticket: &Ticket, result: &WorkResult) -> f64 {
    let mut score = 0.0;

    if result.success {
        score += 0.3;
    }

    let total = ticket.acceptance_criteria.len();
    if total > 0 {
        score += 0.4 * (ticket.criteria_met() as f64 / total as f64);
    }

    match &result.test_counts {
        Some(tc) if tc.total > 0 => {
            score += 0.3 * (tc.passed as f64 / tc.total as f64);
        }
        Some(_) => {}
        None => score += NO_TESTS_CONTRIBUTION,
    }

    score.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Diff feedback
// ---------------------------------------------------------------------------

fn analyze_diff(diff: &str) -> Vec<String> {
    if diff.trim().is_empty() {
        return vec!["no code changes detected".to_string()];
    }

    let added: Vec<&str> = diff
        .lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .collect();
    let removed = diff
        .lines()
        .filter(|l| l.starts_with('-') && !l.starts_with("---"))
        .count();

    let mut feedback = vec![format!("changes: +{} -{} lines", added.len(), removed)];
    if added
        .iter()
        .any(|l| l.contains("print(") || l.contains("console.log("))
    {
        feedback.push("debug statements detected - consider removing".to_string());
    }
    if added.iter().any(|l| l.contains("TODO") || l.contains("FIXME")) {
        feedback.push("TODO/FIXME comments found - consider tracking as follow-up".to_string());
    }
    feedback
}

// ---------------------------------------------------------------------------
// Follow-up injection
// ---------------------------------------------------------------------------

/// One new ticket per distinct trigger: a failing-tests trigger, plus one per
/// log line carrying a follow-up marker. Every follow-up depends on its
/// parent.
fn identify_follow_ups(ticket: &Ticket, result: &WorkResult) -> Vec<Ticket> {
    let mut follow_ups = Vec::new();

    if let Some(tc) = &result.test_counts {
        if tc.failed > 0 {
            let mut fu = Ticket::new(
                format!("{}-FU-1", ticket.id),
                format!("Fix test failures for {}", ticket.title),
            );
            fu.description = format!("Address {} failing test(s)", tc.failed);
            fu.acceptance_criteria = vec![AcceptanceCriterion::new("All tests pass")];
            fu.priority = TicketPriority::High;
            fu.dependencies = vec![ticket.id.clone()];
            follow_ups.push(fu);
        }
    }

    for line in &result.logs {
        if line.contains("TODO") || line.to_lowercase().contains("follow-up") {
            let excerpt: String = line.chars().take(100).collect();
            let mut fu = Ticket::new(
                format!("{}-FU-{}", ticket.id, follow_ups.len() + 1),
                format!("Follow-up for {}", ticket.title),
            );
            fu.description = format!("Address item from logs: {excerpt}");
            fu.acceptance_criteria = vec![AcceptanceCriterion::new("Complete follow-up work")];
            fu.dependencies = vec![ticket.id.clone()];
            follow_ups.push(fu);
        }
    }

    follow_ups
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub approval_rate: f64,
    pub average_alignment_score: f64,
    pub follow_ups: usize,
}

pub fn summarize<'a>(reviews: impl IntoIterator<Item = &'a ReviewOutcome>) -> ReviewSummary {
    let reviews: Vec<&ReviewOutcome> = reviews.into_iter().collect();
    let total = reviews.len();
    let approved = reviews.iter().filter(|r| r.approved).count();
    let average = if total > 0 {
        reviews.iter().map(|r| r.alignment_score).sum::<f64>() / total as f64
    } else {
        0.0
    };
    ReviewSummary {
        total,
        approved,
        rejected: total - approved,
        approval_rate: if total > 0 {
            approved as f64 / total as f64
        } else {
            0.0
        },
        average_alignment_score: average,
        follow_ups: reviews.iter().map(|r| r.follow_up_tickets.len()).sum(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
