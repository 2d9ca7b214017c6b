//! Repository target

use serde::{Deserialize, Serialize};

/// A concrete repository at a concrete revision
///
/// Identity is `id` alone; `name` and `revision` are descriptive. The engine
/// keys its duplicate check and status map on [`RepoTarget::identity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoTarget {
    pub id: String,
    pub name: String,
    pub revision: String,
}

impl RepoTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            revision: revision.into(),
        }
    }

    /// Canonical identity string
    pub fn identity(&self) -> &str {
        &self.id
    }

    /// Filesystem-safe name used for temp directories and log files
    ///
    /// e.g. `github.com/org/repo` at `main` -> `github.com-org-repo-main`
    pub fn slug(&self) -> String {
        let raw = format!("{}-{}", self.name, self.revision);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

impl std::fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_replaces_separators() {
        let repo = RepoTarget::new("1", "github.com/org/repo", "feature/x");
        assert_eq!(repo.slug(), "github.com-org-repo-feature-x");
    }

    #[test]
    fn test_identity_ignores_descriptive_fields() {
        let a = RepoTarget::new("R1", "a", "main");
        let b = RepoTarget::new("R1", "b", "dev");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_display() {
        let repo = RepoTarget::new("1", "org/repo", "main");
        assert_eq!(repo.to_string(), "org/repo@main");
    }
}
