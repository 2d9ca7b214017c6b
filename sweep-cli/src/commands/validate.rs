//! Validate command handler

use anyhow::Result;
use colored::*;
use std::path::Path;

use sweep_core::Step;

use super::load_spec;

/// Validates a spec document and prints a short summary of it
pub async fn handle_validate(path: &Path) -> Result<()> {
    let spec = load_spec(path).await?;

    let containers = spec
        .steps
        .iter()
        .filter(|step| matches!(step, Step::Container { .. }))
        .count();

    eprintln!(
        "{} {} is valid: {} step(s), {} in containers",
        "✓".green(),
        path.display(),
        spec.steps.len(),
        containers
    );
    if !spec.selection_query.is_empty() {
        eprintln!("  {} {}", "Selection:".bold(), spec.selection_query);
    }
    for (index, step) in spec.steps.iter().enumerate() {
        eprintln!("  {} {}", format!("{}.", index).dimmed(), step.describe());
    }

    Ok(())
}
