//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod exec;
mod validate;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use sweep_core::Spec;
use sweep_core::dto::spec::SpecDocument;

use crate::config::EngineArgs;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a spec against every selected repository and print the patches
    Exec {
        /// Path to the spec document
        #[arg(short = 'f', long = "file")]
        spec: PathBuf,

        /// Path to the repository manifest
        #[arg(long, env = "SWEEP_REPOS")]
        repos: PathBuf,

        /// Print patches and exit successfully even if some repositories failed
        #[arg(long)]
        skip_errors: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Validate a spec document without running it
    Validate {
        /// Path to the spec document
        #[arg(short = 'f', long = "file")]
        spec: PathBuf,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Exec {
            spec,
            repos,
            skip_errors,
            engine,
        } => exec::handle_exec(&spec, &repos, skip_errors, &engine).await,
        Commands::Validate { spec } => validate::handle_validate(&spec).await,
    }
}

/// Reads and validates a spec document
async fn load_spec(path: &Path) -> Result<Spec> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read spec file: {}", path.display()))?;
    SpecDocument::parse(&source)
        .with_context(|| format!("Invalid spec file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_spec() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "selectionQuery": "org/", "steps": [ {{ "type": "command", "args": ["true"] }} ] }}"#
        )
        .unwrap();

        let spec = load_spec(file.path()).await.unwrap();
        assert_eq!(spec.selection_query, "org/");
        assert_eq!(spec.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_load_spec_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "steps": [ {{ "type": "command" }} ] }}"#).unwrap();

        let err = load_spec(file.path()).await.unwrap_err();
        assert!(format!("{}", err).contains("Invalid spec file"));

        let err = load_spec(Path::new("/nonexistent/spec.json")).await.unwrap_err();
        assert!(format!("{}", err).contains("Failed to read spec file"));
    }
}
