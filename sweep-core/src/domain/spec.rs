//! Spec domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A validated spec: which repositories to target and what to run in them.
///
/// Built from a [`crate::dto::spec::SpecDocument`] via `TryFrom`, so every
/// instance has already passed validation. Immutable once execution starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub selection_query: String,
    pub steps: Vec<Step>,
}

impl Spec {
    /// Returns true if any step needs a container runtime
    pub fn has_container_steps(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, Step::Container { .. }))
    }
}

/// One executable unit within a spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    /// Local command, run with the checkout as working directory.
    /// `args` is never empty.
    Command {
        args: Vec<String>,
        #[serde(default)]
        cache_dirs: BTreeSet<String>,
    },
    /// Command run inside a container with the checkout mounted.
    Container {
        image: ImageSource,
        #[serde(default)]
        cache_dirs: BTreeSet<String>,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Step {
    /// Short human description, used for `currently_executing`
    pub fn describe(&self) -> String {
        match self {
            Step::Command { args, .. } => args.join(" "),
            Step::Container { image, args, .. } => {
                let image = match image {
                    ImageSource::Reference(reference) => reference.as_str(),
                    ImageSource::BuildRecipe(_) => "<inline recipe>",
                };
                if args.is_empty() {
                    format!("container {}", image)
                } else {
                    format!("container {} {}", image, args.join(" "))
                }
            }
        }
    }

    pub fn cache_dirs(&self) -> &BTreeSet<String> {
        match self {
            Step::Command { cache_dirs, .. } | Step::Container { cache_dirs, .. } => cache_dirs,
        }
    }
}

/// Where a container step's image comes from. Exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSource {
    /// An image reference such as `alpine:3.19`
    Reference(String),
    /// An inline build recipe (Dockerfile contents)
    BuildRecipe(String),
}
