//! Spec document DTOs
//!
//! The JSON shape users write:
//!
//! ```json
//! { "selectionQuery": "repo:^github.com/org/",
//!   "steps": [ { "type": "command", "args": ["sh", "-c", "gofmt -w ."] },
//!              { "type": "container", "image": "alpine:3", "args": ["true"] } ] }
//! ```
//!
//! Parsing is lenient about shape (every field optional) so that validation
//! can report which step is wrong and why.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::domain::spec::{ImageSource, Spec, Step};
use crate::error::{Result, SpecError};

/// Raw spec document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocument {
    #[serde(default, alias = "scopeQuery")]
    pub selection_query: String,
    #[serde(default, alias = "run")]
    pub steps: Vec<StepDocument>,
}

/// Raw step as written in the document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, alias = "dockerfile", skip_serializing_if = "Option::is_none")]
    pub build_recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Engine-internal; rejected if present, even as `null`
    #[serde(
        default,
        alias = "imageContentDigest",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_fingerprint: Option<serde_json::Value>,
}

/// Maps any value, `null` included, to `Some` so that presence is recorded
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl SpecDocument {
    /// Parses and validates a JSON spec document
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or any step is invalid.
    pub fn parse(source: &str) -> Result<Spec> {
        let document: SpecDocument = serde_json::from_str(source)?;
        Spec::try_from(document)
    }
}

impl TryFrom<SpecDocument> for Spec {
    type Error = SpecError;

    fn try_from(document: SpecDocument) -> Result<Self> {
        let steps = document
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| validate_step(index, step))
            .collect::<Result<Vec<_>>>()?;

        Ok(Spec {
            selection_query: document.selection_query,
            steps,
        })
    }
}

/// Validates a single step and converts it to its domain form
fn validate_step(index: usize, step: StepDocument) -> Result<Step> {
    if step.content_fingerprint.is_some() {
        return Err(SpecError::InternalField { index });
    }

    let cache_dirs: BTreeSet<String> = step.cache_dirs.into_iter().collect();

    match step.kind.as_str() {
        "command" => {
            if step.image.is_some() || step.build_recipe.is_some() {
                return Err(SpecError::ImageOnCommand { index });
            }
            if step.args.is_empty() {
                return Err(SpecError::EmptyCommand { index });
            }
            Ok(Step::Command {
                args: step.args,
                cache_dirs,
            })
        }
        "container" | "docker" => {
            let image = match (step.image, step.build_recipe) {
                (Some(image), Some(_)) => return Err(SpecError::ImageAndRecipe { index, image }),
                (Some(image), None) if !image.trim().is_empty() => ImageSource::Reference(image),
                (None, Some(recipe)) if !recipe.trim().is_empty() => {
                    ImageSource::BuildRecipe(recipe)
                }
                _ => return Err(SpecError::MissingImage { index }),
            };
            Ok(Step::Container {
                image,
                cache_dirs,
                args: step.args,
            })
        }
        other => Err(SpecError::UnknownStepType {
            index,
            kind: other.to_string(),
        }),
    }
}
