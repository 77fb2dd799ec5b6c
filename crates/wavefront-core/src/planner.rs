use crate::ticket::Ticket;
use serde::Serialize;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A maximal, dependency-satisfied batch of tickets safe to run concurrently.
#[derive(Debug, Clone, Serialize)]
pub struct Wave {
    pub number: usize,
    pub ticket_ids: Vec<String>,
}

/// A ticket that could not be placed in any wave, with the dependency ids
/// that were never satisfied (missing from the set or part of a cycle).
#[derive(Debug, Clone, Serialize)]
pub struct Unschedulable {
    pub ticket_id: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WavePlan {
    pub waves: Vec<Wave>,
    pub unschedulable: Vec<Unschedulable>,
}

impl WavePlan {
    pub fn scheduled_count(&self) -> usize {
        self.waves.iter().map(|w| w.ticket_ids.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.unschedulable.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Batch pending tickets into an ordered sequence of maximal parallel waves.
///
/// A ticket is placed in wave `k` once its full dependency set is satisfied
/// by tickets in waves `0..k`. Terminal tickets (completed or failed) count
/// as satisfied from the start, so re-planning after follow-up injection
/// works: dependency satisfaction means "executed", not "approved".
///
/// Cyclic or missing dependencies never fail the call; the leftover tickets
/// are returned as `unschedulable`, each with its unresolved edges.
/// Wave membership is stable: tickets keep their original relative order.
pub fn plan(tickets: &[Ticket]) -> WavePlan {
    let mut satisfied: HashSet<&str> = tickets
        .iter()
        .filter(|t| t.status.is_terminal())
        .map(|t| t.id.as_str())
        .collect();

    let mut remaining: Vec<&Ticket> = tickets
        .iter()
        .filter(|t| !t.status.is_terminal())
        .collect();

    let mut waves = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<&Ticket> = remaining
            .iter()
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|dep| satisfied.contains(dep.as_str()))
            })
            .copied()
            .collect();

        if ready.is_empty() {
            // Cycle or missing dependency: surface the residue, don't fail.
            break;
        }

        let ids: HashSet<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        satisfied.extend(ids.iter().copied());
        remaining.retain(|t| !ids.contains(t.id.as_str()));
        waves.push(Wave {
            number: waves.len() + 1,
            ticket_ids: ready.iter().map(|t| t.id.clone()).collect(),
        });
    }

    let unschedulable = remaining
        .iter()
        .map(|t| Unschedulable {
            ticket_id: t.id.clone(),
            missing: t
                .dependencies
                .iter()
                .filter(|dep| !satisfied.contains(dep.as_str()))
                .cloned()
                .collect(),
        })
        .collect();

    WavePlan {
        waves,
        unschedulable,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketStatus;

    fn ticket(id: &str, deps: &[&str]) -> Ticket {
        let mut t = Ticket::new(id, format!("Ticket {id}"));
        t.dependencies = deps.iter().map(|d| d.to_string()).collect();
        t
    }

    #[test]
    fn diamond_dag_produces_three_waves() {
        let tickets = vec![
            ticket("A", &[]),
            ticket("B", &["A"]),
            ticket("C", &["A"]),
            ticket("D", &["B", "C"]),
        ];
        let plan = plan(&tickets);
        assert!(plan.is_complete());
        assert_eq!(plan.waves.len(), 3);
        assert_eq!(plan.waves[0].ticket_ids, vec!["A"]);
        assert_eq!(plan.waves[1].ticket_ids, vec!["B", "C"]);
        assert_eq!(plan.waves[2].ticket_ids, vec!["D"]);
    }

    #[test]
    fn independent_tickets_form_one_wave() {
        let tickets = vec![ticket("A", &[]), ticket("B", &[]), ticket("C", &[])];
        let plan = plan(&tickets);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].ticket_ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn waves_are_maximal() {
        // B is eligible in wave 1 and must not be deferred.
        let tickets = vec![ticket("A", &[]), ticket("B", &[]), ticket("C", &["A"])];
        let plan = plan(&tickets);
        assert_eq!(plan.waves[0].ticket_ids, vec!["A", "B"]);
        assert_eq!(plan.waves[1].ticket_ids, vec!["C"]);
    }

    #[test]
    fn every_ticket_in_exactly_one_wave() {
        let tickets = vec![
            ticket("A", &[]),
            ticket("B", &["A"]),
            ticket("C", &["A", "B"]),
            ticket("D", &[]),
        ];
        let plan = plan(&tickets);
        let mut seen = HashSet::new();
        for wave in &plan.waves {
            for id in &wave.ticket_ids {
                assert!(seen.insert(id.clone()), "{id} placed twice");
            }
        }
        assert_eq!(seen.len(), tickets.len());
    }

    #[test]
    fn dependencies_land_in_strictly_earlier_waves() {
        let tickets = vec![
            ticket("A", &[]),
            ticket("B", &["A"]),
            ticket("C", &["B"]),
            ticket("D", &["A", "C"]),
        ];
        let plan = plan(&tickets);
        let wave_of = |id: &str| {
            plan.waves
                .iter()
                .position(|w| w.ticket_ids.iter().any(|t| t == id))
                .unwrap()
        };
        for t in &tickets {
            for dep in &t.dependencies {
                assert!(wave_of(dep) < wave_of(&t.id));
            }
        }
    }

    #[test]
    fn cycle_terminates_with_residue() {
        let tickets = vec![ticket("A", &["B"]), ticket("B", &["A"]), ticket("C", &[])];
        let plan = plan(&tickets);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].ticket_ids, vec!["C"]);
        assert_eq!(plan.unschedulable.len(), 2);
        let ids: Vec<&str> = plan
            .unschedulable
            .iter()
            .map(|u| u.ticket_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn missing_dependency_reported_as_edge() {
        let tickets = vec![ticket("A", &["GHOST"])];
        let plan = plan(&tickets);
        assert!(plan.waves.is_empty());
        assert_eq!(plan.unschedulable.len(), 1);
        assert_eq!(plan.unschedulable[0].missing, vec!["GHOST"]);
    }

    #[test]
    fn terminal_tickets_satisfy_dependencies() {
        let mut parent = ticket("A", &[]);
        parent.status = TicketStatus::Failed;
        let tickets = vec![parent, ticket("A-FU-1", &["A"])];
        let plan = plan(&tickets);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].ticket_ids, vec!["A-FU-1"]);
        assert!(plan.is_complete());
    }

    #[test]
    fn terminal_tickets_are_not_replanned() {
        let mut done = ticket("A", &[]);
        done.status = TicketStatus::Completed;
        let tickets = vec![done];
        let plan = plan(&tickets);
        assert!(plan.waves.is_empty());
        assert!(plan.is_complete());
    }

    #[test]
    fn empty_set_plans_to_nothing() {
        let plan = plan(&[]);
        assert!(plan.waves.is_empty());
        assert!(plan.unschedulable.is_empty());
        assert_eq!(plan.scheduled_count(), 0);
    }
}
