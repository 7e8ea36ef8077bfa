//! `panelbot-perception` – object localization from a single camera frame.
//!
//! Turns one RGB frame into a 3-D position estimate of the wrench or valve
//! relative to the end effector.
//!
//! # Stages
//!
//! ```text
//! frame ─► preprocess ─► segment ─► hough + cluster ─► geometry ─► vote ─► back-project
//!          (crop,        (Otsu,     (circle heads,     (contours,  (Gaussian
//!           stretch,      opening)   k-means)           bbox)       likelihood)
//!           background)
//! ```
//!
//! The wrench path runs every stage.  The valve path skips clustering and
//! voting and takes the left-most circle.  Both share the camera
//! back-projection in [`pipeline::LocalizationPipeline`].
//!
//! # Modules
//!
//! - [`preprocess`] – occlusion crop, contrast stretch, background suppression.
//! - [`segment`] – grayscale/median/Otsu segmentation with an elliptical opening.
//! - [`hough`] – gradient Hough circle transform.
//! - [`cluster`] – k-means grouping of circle centres.
//! - [`geometry`] – contour centroid, bounding box and area.
//! - [`vote`] – normalized Gaussian multi-criteria voting.
//! - [`pipeline`] – [`LocalizationPipeline`][pipeline::LocalizationPipeline]
//!   and the pluggable [`CandidateSelector`][pipeline::CandidateSelector].
//! - [`wrench`] / [`valve`] – the two selectors and valve centering.
//! - [`annotate`] – debug drawing of candidates.

pub mod annotate;
pub mod cluster;
pub mod error;
pub mod geometry;
pub mod hough;
pub mod pipeline;
pub mod preprocess;
pub mod segment;
pub mod valve;
pub mod vote;
pub mod wrench;

pub use error::LocalizeError;
pub use pipeline::{Candidate, CandidateSelector, Detection, LocalizationPipeline, ObjectEstimate};
pub use valve::{CenteringConfig, ValveCentering, ValveConfig, ValveSelector};
pub use vote::{GaussianCriterion, VoteCalibration};
pub use wrench::{WrenchConfig, WrenchSelector};
