use serde::{Deserialize, Serialize};
use strum::VariantArray;

/// Ordered pipeline stages.
///
/// The order of variants is the execution order, and each stage carries a
/// fixed progress target the job advances to when the stage succeeds. Both
/// are compile-time contracts: the orchestrator iterates [`Stage::all`] and
/// never dispatches on stage names at runtime.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Multiview,
    Reconstruct,
    ExtractMesh,
    Retopologize,
    Texture,
    Export,
}

/// Progress value persisted when the final completion transaction commits.
pub const COMPLETED_PROGRESS: f64 = 1.0;

impl Stage {
    /// All stages in execution order.
    pub fn all() -> &'static [Stage] {
        Stage::VARIANTS
    }

    /// The progress value a job advances to when this stage succeeds.
    pub fn progress_target(self) -> f64 {
        match self {
            Stage::Preprocess => 0.05,
            Stage::Multiview => 0.20,
            Stage::Reconstruct => 0.45,
            Stage::ExtractMesh => 0.70,
            Stage::Retopologize => 0.80,
            Stage::Texture => 0.90,
            Stage::Export => 0.95,
        }
    }
}

/// Failure produced by a pipeline stage.
///
/// `retryable` distinguishes transient conditions (e.g. an engine backend
/// briefly unavailable) from inputs that can never succeed. The base design
/// does not retry either kind automatically; the flag is carried for
/// external retry decisions.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
    pub retryable: bool,
}

impl StageError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}
