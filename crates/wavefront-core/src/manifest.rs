use crate::error::{Result, WavefrontError};
use crate::ticket::{AcceptanceCriterion, Ticket};
use crate::types::TicketPriority;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// TicketSpec
// ---------------------------------------------------------------------------

/// One ticket as written in the run manifest. `command` is the optional work
/// payload handed to the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

// ---------------------------------------------------------------------------
// RunManifest
// ---------------------------------------------------------------------------

/// YAML description of one run: the objective plus the ticket set produced
/// by the decomposition collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    pub tickets: Vec<TicketSpec>,
}

impl RunManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let manifest: RunManifest = serde_yaml::from_str(&data)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural validation; violations are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.tickets {
            if spec.id.trim().is_empty() {
                return Err(WavefrontError::EmptyTicketId);
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(WavefrontError::DuplicateTicket(spec.id.clone()));
            }
        }
        Ok(())
    }

    pub fn to_tickets(&self) -> Vec<Ticket> {
        self.tickets
            .iter()
            .map(|spec| {
                let mut t = Ticket::new(&spec.id, &spec.title);
                t.description = spec.description.clone();
                t.acceptance_criteria = spec
                    .acceptance_criteria
                    .iter()
                    .map(AcceptanceCriterion::new)
                    .collect();
                t.dependencies = spec.dependencies.clone();
                t.priority = spec.priority;
                t
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = "\
objective: Ship the auth flow
tickets:
  - id: TKT-001
    title: Add user model
    description: Create the user table and model
    acceptance_criteria:
      - Model compiles
      - Migration applies
  - id: TKT-002
    title: Add login page
    dependencies: [TKT-001]
    priority: high
    command: \"true\"
";

    #[test]
    fn load_parses_tickets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = RunManifest::load(&path).unwrap();
        assert_eq!(manifest.objective.as_deref(), Some("Ship the auth flow"));
        assert_eq!(manifest.tickets.len(), 2);
        assert_eq!(manifest.tickets[1].priority, TicketPriority::High);
        assert_eq!(manifest.tickets[1].command.as_deref(), Some("true"));
    }

    #[test]
    fn to_tickets_carries_fields() {
        let manifest: RunManifest = serde_yaml::from_str(MANIFEST).unwrap();
        let tickets = manifest.to_tickets();
        assert_eq!(tickets[0].acceptance_criteria.len(), 2);
        assert!(!tickets[0].acceptance_criteria[0].met);
        assert_eq!(tickets[1].dependencies, vec!["TKT-001"]);
        assert_eq!(tickets[1].priority, TicketPriority::High);
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let yaml = "\
tickets:
  - id: X
    title: one
  - id: X
    title: two
";
        let manifest: RunManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(WavefrontError::DuplicateTicket(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_id() {
        let yaml = "\
tickets:
  - id: \"\"
    title: unnamed
";
        let manifest: RunManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(WavefrontError::EmptyTicketId)
        ));
    }

    #[test]
    fn load_missing_file_is_fatal() {
        assert!(RunManifest::load(Path::new("/nonexistent/run.yaml")).is_err());
    }
}
