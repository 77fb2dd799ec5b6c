use crate::output;
use std::path::Path;
use wavefront_core::manifest::RunManifest;
use wavefront_core::planner;

pub fn run(manifest_path: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = RunManifest::load(manifest_path)?;
    let tickets = manifest.to_tickets();
    let plan = planner::plan(&tickets);

    if json {
        return output::print_json(&plan);
    }

    if let Some(objective) = &manifest.objective {
        println!("objective: {objective}\n");
    }
    let rows = plan
        .waves
        .iter()
        .map(|w| vec![w.number.to_string(), w.ticket_ids.join(", ")])
        .collect();
    output::print_table(&["wave", "tickets"], rows);

    if !plan.unschedulable.is_empty() {
        println!("\nunschedulable:");
        for entry in &plan.unschedulable {
            println!(
                "  {} (unresolved: {})",
                entry.ticket_id,
                entry.missing.join(", ")
            );
        }
    }
    Ok(())
}
