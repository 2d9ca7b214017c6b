//! Error types for spec parsing and validation

use thiserror::Error;

/// Result type alias for spec operations
pub type Result<T> = std::result::Result<T, SpecError>;

/// Errors that make a spec unusable
///
/// All of these are fatal to a whole run: nothing executes until the spec
/// validates.
#[derive(Debug, Error)]
pub enum SpecError {
    /// The document is not valid JSON or has the wrong shape
    #[error("invalid spec document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Step type is neither `command` nor `container`
    #[error("step {index}: unknown step type {kind:?}")]
    UnknownStepType { index: usize, kind: String },

    /// Container step names both an image and a build recipe
    #[error("step {index}: container step may specify either image ({image:?}) or buildRecipe, not both")]
    ImageAndRecipe { index: usize, image: String },

    /// Container step names neither an image nor a build recipe
    #[error("step {index}: container step must specify exactly one of image or buildRecipe")]
    MissingImage { index: usize },

    /// Command step without arguments
    #[error("step {index}: command step must specify a non-empty args list")]
    EmptyCommand { index: usize },

    /// Command step with image fields
    #[error("step {index}: command step must not specify image or buildRecipe")]
    ImageOnCommand { index: usize },

    /// User tried to set the engine-internal fingerprint
    #[error("step {index}: contentFingerprint is computed by the engine and must not be set")]
    InternalField { index: usize },
}
