use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TicketStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    NeedsReview,
    Completed,
    Failed,
}

impl TicketStatus {
    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::Pending,
            TicketStatus::InProgress,
            TicketStatus::NeedsReview,
            TicketStatus::Completed,
            TicketStatus::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::NeedsReview => "needs_review",
            TicketStatus::Completed => "completed",
            TicketStatus::Failed => "failed",
        }
    }

    /// Terminal tickets are never scheduled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Failed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = crate::error::WavefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "in_progress" => Ok(TicketStatus::InProgress),
            "needs_review" => Ok(TicketStatus::NeedsReview),
            "completed" => Ok(TicketStatus::Completed),
            "failed" => Ok(TicketStatus::Failed),
            _ => Err(crate::error::WavefrontError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TicketPriority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Critical => "critical",
        }
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        TicketPriority::Medium
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        use std::str::FromStr;
        for status in TicketStatus::all() {
            let parsed = TicketStatus::from_str(status.as_str()).unwrap();
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(TicketStatus::Completed.is_terminal());
        assert!(TicketStatus::Failed.is_terminal());
        assert!(!TicketStatus::Pending.is_terminal());
        assert!(!TicketStatus::NeedsReview.is_terminal());
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&TicketStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");
    }

    #[test]
    fn priority_ordering() {
        assert!(TicketPriority::Low < TicketPriority::Medium);
        assert!(TicketPriority::High < TicketPriority::Critical);
    }

    #[test]
    fn priority_default_is_medium() {
        assert_eq!(TicketPriority::default(), TicketPriority::Medium);
    }
}
