//! Exec command handler
//!
//! Resolves repositories from the manifest, runs the spec across them with
//! live progress on stderr, and prints the resulting patches as JSON on
//! stdout.

use anyhow::{Context, Result};
use colored::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use sweep_core::Patch;
use sweep_engine::{
    CancelToken, CliRuntime, Coordinator, GitCheckout, ManifestResolver, RepoResolver, RunError,
};

use super::load_spec;
use crate::config::EngineArgs;
use crate::progress::TerminalProgress;

/// Runs a spec and prints its patches
///
/// # Arguments
/// * `spec_path` - Spec document to run
/// * `repos_path` - Repository manifest
/// * `skip_errors` - Succeed even if some repositories failed
/// * `engine` - Engine flags
pub async fn handle_exec(
    spec_path: &Path,
    repos_path: &Path,
    skip_errors: bool,
    engine: &EngineArgs,
) -> Result<()> {
    let spec = load_spec(spec_path).await?;
    let config = engine.engine_config()?;

    let resolver = ManifestResolver::load(repos_path).await?;
    let repos = resolver
        .resolve(&spec.selection_query)
        .await
        .context("Failed to resolve repositories")?;
    info!("Selected {} repositories", repos.len());

    let runtime = Arc::new(CliRuntime::new(
        config.container_program.clone(),
        config.work_dir.clone(),
    ));
    if spec.has_container_steps() {
        runtime.check_available().await.with_context(|| {
            format!(
                "Container runtime '{}' is not available",
                config.container_program
            )
        })?;
    }

    let sources: HashMap<String, String> = resolver
        .entries()
        .iter()
        .map(|entry| (entry.id.clone(), entry.source.clone()))
        .collect();

    let progress = Arc::new(TerminalProgress::stderr());
    let mut coordinator = Coordinator::new(
        spec,
        config,
        runtime,
        Arc::new(GitCheckout::new(sources)),
    )?
    .with_progress(progress.clone());

    for repo in repos {
        coordinator.enqueue(repo)?;
    }

    let cancel = CancelToken::new();
    spawn_interrupt_handler(cancel.clone());

    coordinator.start(cancel)?;
    let result = coordinator.wait().await;
    progress.finish();

    let patches = coordinator.collect();
    print_patches(&patches)?;
    print_summary(&patches);

    match result {
        Ok(()) => Ok(()),
        Err(RunError::TasksFailed(failures)) if skip_errors => {
            warn!("{} repositories failed, continuing", failures.len());
            eprintln!(
                "{}",
                format!(
                    "Skipped {} failing repositor{}:",
                    failures.len(),
                    if failures.len() == 1 { "y" } else { "ies" }
                )
                .yellow()
            );
            for failure in &failures {
                eprintln!("  {} {}", "✗".red(), failure);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancels the run on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping running steps...".yellow());
            cancel.cancel();
        }
    });
}

fn print_patches(patches: &[Patch]) -> Result<()> {
    let json = serde_json::to_string_pretty(patches).context("Failed to encode patches")?;
    println!("{}", json);
    Ok(())
}

fn print_summary(patches: &[Patch]) {
    if patches.is_empty() {
        eprintln!("{}", "No changes produced.".yellow());
        return;
    }

    eprintln!(
        "{}",
        format!("Produced {} patch(es):", patches.len()).bold()
    );
    for patch in patches {
        let stat = patch.stat();
        let (plus, minus) = stat.diagram(40);
        eprintln!(
            "  {} {} {}{}",
            patch.repository,
            stat.description().dimmed(),
            plus.green(),
            minus.red()
        );
    }
}
