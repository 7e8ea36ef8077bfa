//! Per-frame localization failures.

use thiserror::Error;

/// Why a frame produced no estimate.
///
/// All variants are transient from the caller's point of view: the next
/// frame may succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalizeError {
    #[error("frame is empty")]
    EmptyFrame,

    #[error("no circles detected")]
    NoCircles,

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("expected {expected} contours, found {found}")]
    ContourCountMismatch { expected: usize, found: usize },

    #[error("standoff distance must be positive, got {0}")]
    InvalidStandoff(f64),
}
