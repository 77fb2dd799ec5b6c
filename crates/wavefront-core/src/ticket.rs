use crate::error::{Result, WavefrontError};
use crate::types::{TicketPriority, TicketStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AcceptanceCriterion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub description: String,
    #[serde(default)]
    pub met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl AcceptanceCriterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            met: false,
            evidence: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// One schedulable unit of work with dependencies and acceptance criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
}

impl Ticket {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            status: TicketStatus::Pending,
            priority: TicketPriority::Medium,
            dependencies: Vec::new(),
            assigned_worker: None,
        }
    }

    pub fn criteria_met(&self) -> usize {
        self.acceptance_criteria.iter().filter(|c| c.met).count()
    }

    pub fn all_criteria_met(&self) -> bool {
        self.acceptance_criteria.iter().all(|c| c.met)
    }
}

// ---------------------------------------------------------------------------
// Ticket list operations (operate on a mutable Vec<Ticket>)
// ---------------------------------------------------------------------------

pub fn find<'a>(tickets: &'a [Ticket], id: &str) -> Option<&'a Ticket> {
    tickets.iter().find(|t| t.id == id)
}

pub fn find_mut<'a>(tickets: &'a mut [Ticket], id: &str) -> Result<&'a mut Ticket> {
    tickets
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| WavefrontError::TicketNotFound(id.to_string()))
}

pub fn set_status(tickets: &mut [Ticket], id: &str, status: TicketStatus) -> Result<()> {
    find_mut(tickets, id)?.status = status;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub needs_review: usize,
    pub completed: usize,
    pub failed: usize,
}

pub fn status_counts(tickets: &[Ticket]) -> StatusCounts {
    let count = |s: TicketStatus| tickets.iter().filter(|t| t.status == s).count();
    StatusCounts {
        total: tickets.len(),
        pending: count(TicketStatus::Pending),
        in_progress: count(TicketStatus::InProgress),
        needs_review: count(TicketStatus::NeedsReview),
        completed: count(TicketStatus::Completed),
        failed: count(TicketStatus::Failed),
    }
}

/// Human-readable summary: "3/5 completed, 1 failed, 1 pending"
pub fn summarize(tickets: &[Ticket]) -> String {
    let c = status_counts(tickets);
    format!(
        "{}/{} completed, {} failed, {} pending",
        c.completed, c.total, c.failed, c.pending
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str) -> Ticket {
        Ticket::new(id, format!("Ticket {id}"))
    }

    #[test]
    fn new_ticket_is_pending() {
        let t = ticket("TKT-001");
        assert_eq!(t.status, TicketStatus::Pending);
        assert_eq!(t.priority, TicketPriority::Medium);
        assert!(t.dependencies.is_empty());
        assert!(t.assigned_worker.is_none());
    }

    #[test]
    fn criteria_counting() {
        let mut t = ticket("TKT-001");
        t.acceptance_criteria = vec![
            AcceptanceCriterion::new("first"),
            AcceptanceCriterion::new("second"),
        ];
        assert_eq!(t.criteria_met(), 0);
        assert!(!t.all_criteria_met());

        t.acceptance_criteria[0].met = true;
        assert_eq!(t.criteria_met(), 1);

        t.acceptance_criteria[1].met = true;
        assert!(t.all_criteria_met());
    }

    #[test]
    fn empty_criteria_counts_as_all_met() {
        let t = ticket("TKT-001");
        assert!(t.all_criteria_met());
    }

    #[test]
    fn set_status_transitions() {
        let mut tickets = vec![ticket("TKT-001")];
        set_status(&mut tickets, "TKT-001", TicketStatus::InProgress).unwrap();
        assert_eq!(tickets[0].status, TicketStatus::InProgress);
        set_status(&mut tickets, "TKT-001", TicketStatus::NeedsReview).unwrap();
        assert_eq!(tickets[0].status, TicketStatus::NeedsReview);
    }

    #[test]
    fn set_status_unknown_ticket() {
        let mut tickets: Vec<Ticket> = Vec::new();
        assert!(matches!(
            set_status(&mut tickets, "TKT-404", TicketStatus::Failed),
            Err(WavefrontError::TicketNotFound(_))
        ));
    }

    #[test]
    fn status_counts_and_summary() {
        let mut tickets = vec![ticket("A"), ticket("B"), ticket("C")];
        tickets[0].status = TicketStatus::Completed;
        tickets[1].status = TicketStatus::Failed;

        let counts = status_counts(&tickets);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);

        assert_eq!(summarize(&tickets), "1/3 completed, 1 failed, 1 pending");
    }

    #[test]
    fn ticket_yaml_roundtrip() {
        let mut t = ticket("TKT-007");
        t.dependencies = vec!["TKT-001".to_string()];
        t.acceptance_criteria = vec![AcceptanceCriterion::new("it works")];
        let yaml = serde_yaml::to_string(&t).unwrap();
        let parsed: Ticket = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.id, "TKT-007");
        assert_eq!(parsed.dependencies, vec!["TKT-001"]);
        assert_eq!(parsed.acceptance_criteria.len(), 1);
        assert!(!parsed.acceptance_criteria[0].met);
    }
}
