//! Cache keys
//!
//! A key captures every input that can change a task's result: the
//! repository identity and revision, and for each step its argv, its
//! declared cache directories and, for container steps, the image's content
//! fingerprint. Image tags never enter a key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use sweep_core::RepoTarget;

use crate::images::{ResolvedSpec, StepAction};

/// Length of the hex digest used for entry file names
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub repository: String,
    pub revision: String,
    pub steps: Vec<StepKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKey {
    #[serde(rename_all = "camelCase")]
    Command {
        args: Vec<String>,
        cache_dirs: BTreeSet<String>,
    },
    #[serde(rename_all = "camelCase")]
    Container {
        content_fingerprint: String,
        args: Vec<String>,
        cache_dirs: BTreeSet<String>,
    },
}

impl CacheKey {
    /// Builds the key of `repo` under an already resolved spec
    pub fn new(repo: &RepoTarget, spec: &ResolvedSpec) -> Self {
        let steps = spec
            .steps
            .iter()
            .map(|step| match &step.action {
                StepAction::Command { args } => StepKey::Command {
                    args: args.clone(),
                    cache_dirs: step.cache_dirs.clone(),
                },
                StepAction::Container {
                    fingerprint, args, ..
                } => StepKey::Container {
                    content_fingerprint: fingerprint.clone(),
                    args: args.clone(),
                    cache_dirs: step.cache_dirs.clone(),
                },
            })
            .collect();

        Self {
            repository: repo.identity().to_string(),
            revision: repo.revision.clone(),
            steps,
        }
    }

    /// Stable hex digest of the canonical JSON form of the key
    pub fn digest(&self) -> String {
        // Field order is fixed by the struct definitions and sets are
        // ordered, so the JSON form is canonical.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut digest = hex::encode(Sha256::digest(&canonical));
        digest.truncate(DIGEST_LEN);
        digest
    }
}
