use crate::planner::Unschedulable;
use crate::review::ReviewOutcome;
use crate::types::TicketStatus;
use crate::work::WorkResult;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One entry in the append-only progress stream. Consumed by dashboards and
/// other observers; the core only emits, it never renders.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StatusChange {
        ticket_id: String,
        status: TicketStatus,
    },
    Progress {
        message: String,
    },
    WaveStarted {
        wave: usize,
        ticket_ids: Vec<String>,
    },
    WaveFinished {
        wave: usize,
    },
    ResultReady {
        result: WorkResult,
    },
    Reviewed {
        outcome: ReviewOutcome,
    },
    Unschedulable {
        entries: Vec<Unschedulable>,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast fan-out for progress events. Workers and the orchestrator emit;
/// any number of subscribers consume. Emitting with no subscribers is fine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.emit(Event::Progress {
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
