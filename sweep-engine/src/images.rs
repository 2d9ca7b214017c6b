//! Image resolver
//!
//! Turns a validated [`Spec`] into a [`ResolvedSpec`] that tasks execute:
//! - inline build recipes are built once per run, never per repository
//! - every container image gets its local content fingerprint, which is
//!   what cache keys are made of
//!
//! Resolution happens lazily on first use and the outcome, success or
//! failure, is shared by every task of the run.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use sweep_core::{ImageSource, Spec, Step};

use crate::container::ContainerRuntime;
use crate::error::ImageError;

/// A step whose image, if any, has been built and fingerprinted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    /// Human description shown while the step runs
    pub description: String,
    pub cache_dirs: BTreeSet<String>,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Command {
        args: Vec<String>,
    },
    Container {
        /// Reference passed to `run`; the built image id for recipes
        image: String,
        fingerprint: String,
        args: Vec<String>,
    },
}

/// The executable form of a spec, shared by all tasks of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub steps: Vec<ResolvedStep>,
}

/// Builds and fingerprints images for one spec, exactly once
pub struct ImageResolver {
    spec: Arc<Spec>,
    runtime: Arc<dyn ContainerRuntime>,
    resolved: OnceCell<Result<Arc<ResolvedSpec>, ImageError>>,
}

impl ImageResolver {
    pub fn new(spec: Arc<Spec>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            spec,
            runtime,
            resolved: OnceCell::new(),
        }
    }

    /// Returns the resolved spec, building and inspecting images on first call
    ///
    /// Concurrent callers wait for the single in-flight resolution.
    pub async fn realize(&self) -> Result<Arc<ResolvedSpec>, ImageError> {
        self.resolved
            .get_or_init(|| async { self.resolve().await.map(Arc::new) })
            .await
            .clone()
    }

    async fn resolve(&self) -> Result<ResolvedSpec, ImageError> {
        // Identical recipes within one spec share one build
        let mut built: HashMap<&str, String> = HashMap::new();
        let mut fingerprints: HashMap<String, String> = HashMap::new();
        let mut steps = Vec::with_capacity(self.spec.steps.len());

        for (index, step) in self.spec.steps.iter().enumerate() {
            let action = match step {
                Step::Command { args, .. } => StepAction::Command { args: args.clone() },
                Step::Container { image, args, .. } => {
                    let image = match image {
                        ImageSource::Reference(reference) => reference.clone(),
                        ImageSource::BuildRecipe(recipe) => {
                            if let Some(id) = built.get(recipe.as_str()) {
                                id.clone()
                            } else {
                                info!("Building container image for step {}", index);
                                let id = self
                                    .runtime
                                    .build(recipe)
                                    .await
                                    .map_err(|source| ImageError::Build { step: index, source })?;
                                built.insert(recipe.as_str(), id.clone());
                                id
                            }
                        }
                    };

                    let fingerprint = match fingerprints.get(&image) {
                        Some(fingerprint) => fingerprint.clone(),
                        None => {
                            let fingerprint = self
                                .runtime
                                .content_fingerprint(&image)
                                .await
                                .map_err(|source| ImageError::Fingerprint {
                                    step: index,
                                    image: image.clone(),
                                    source,
                                })?;
                            fingerprints.insert(image.clone(), fingerprint.clone());
                            fingerprint
                        }
                    };

                    StepAction::Container {
                        image,
                        fingerprint,
                        args: args.clone(),
                    }
                }
            };

            steps.push(ResolvedStep {
                description: step.describe(),
                cache_dirs: step.cache_dirs().clone(),
                action,
            });
        }

        Ok(ResolvedSpec { steps })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::container::ContainerRun;
    use crate::error::RuntimeError;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::process::Command;

    /// Runtime whose image ids are derived from recipe bytes, like a real
    /// content-addressed builder. Tags map to content through `tags`.
    #[derive(Default)]
    pub(crate) struct FakeRuntime {
        pub builds: AtomicUsize,
        pub inspects: AtomicUsize,
        pub tags: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn build(&self, recipe: &str) -> Result<String, RuntimeError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if recipe.contains("FAIL") {
                return Err(RuntimeError::CommandFailed {
                    command: "build".to_string(),
                    output: "syntax error".to_string(),
                });
            }
            Ok(format!("sha256:{}", hex::encode(Sha256::digest(recipe.as_bytes()))))
        }

        async fn content_fingerprint(&self, image: &str) -> Result<String, RuntimeError> {
            self.inspects.fetch_add(1, Ordering::SeqCst);
            if image.starts_with("sha256:") {
                return Ok(image.to_string());
            }
            self.tags
                .lock()
                .unwrap()
                .get(image)
                .cloned()
                .ok_or_else(|| RuntimeError::EmptyFingerprint(image.to_string()))
        }

        fn run_command(&self, run: &ContainerRun) -> Command {
            let mut command = Command::new("sh");
            command.arg("-c").arg(run.args.join(" "));
            command
        }

        async fn kill(&self, _name: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn container_spec(sources: Vec<ImageSource>) -> Arc<Spec> {
        Arc::new(Spec {
            selection_query: String::new(),
            steps: sources
                .into_iter()
                .map(|image| Step::Container {
                    image,
                    cache_dirs: BTreeSet::new(),
                    args: vec!["true".to_string()],
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_recipe_built_once_for_all_callers() {
        let runtime = Arc::new(FakeRuntime::default());
        let recipe = ImageSource::BuildRecipe("FROM alpine\n".to_string());
        let spec = container_spec(vec![recipe.clone(), recipe]);
        let resolver = Arc::new(ImageResolver::new(spec, runtime.clone()));

        let (a, b) = tokio::join!(resolver.realize(), resolver.realize());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(runtime.builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.steps[0].action, a.steps[1].action);
    }

    #[tokio::test]
    async fn test_identical_recipes_fingerprint_identically_across_runs() {
        let recipe = ImageSource::BuildRecipe("FROM alpine\nRUN apk add git\n".to_string());

        let first = ImageResolver::new(
            container_spec(vec![recipe.clone()]),
            Arc::new(FakeRuntime::default()),
        );
        let second = ImageResolver::new(
            container_spec(vec![recipe]),
            Arc::new(FakeRuntime::default()),
        );

        let first = first.realize().await.unwrap();
        let second = second.realize().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_tag_resolves_to_content() {
        let runtime = Arc::new(FakeRuntime::default());
        runtime
            .tags
            .lock()
            .unwrap()
            .insert("alpine:3".to_string(), "sha256:content".to_string());

        let resolver = ImageResolver::new(
            container_spec(vec![ImageSource::Reference("alpine:3".to_string())]),
            runtime,
        );
        let resolved = resolver.realize().await.unwrap();

        match &resolved.steps[0].action {
            StepAction::Container {
                image, fingerprint, ..
            } => {
                assert_eq!(image, "alpine:3");
                assert_eq!(fingerprint, "sha256:content");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_retried() {
        let runtime = Arc::new(FakeRuntime::default());
        let resolver = ImageResolver::new(
            container_spec(vec![ImageSource::BuildRecipe("FAIL".to_string())]),
            runtime.clone(),
        );

        assert!(matches!(
            resolver.realize().await,
            Err(ImageError::Build { step: 0, .. })
        ));
        assert!(resolver.realize().await.is_err());
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_command_only_spec_never_touches_runtime() {
        let runtime = Arc::new(FakeRuntime::default());
        let spec = Arc::new(Spec {
            selection_query: String::new(),
            steps: vec![Step::Command {
                args: vec!["true".to_string()],
                cache_dirs: BTreeSet::new(),
            }],
        });

        let resolved = ImageResolver::new(spec, runtime.clone()).realize().await.unwrap();
        assert_eq!(resolved.steps.len(), 1);
        assert_eq!(runtime.inspects.load(Ordering::SeqCst), 0);
    }
}
