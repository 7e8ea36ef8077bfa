//! The localization pipeline and its pluggable candidate selector.
//!
//! A [`CandidateSelector`] turns a frame into a list of [`Candidate`]s and
//! picks one.  [`LocalizationPipeline`] wraps a selector with the camera
//! model and back-projects the chosen candidate into an [`ObjectEstimate`].
//!
//! # Example
//!
//! ```rust
//! use image::{Rgb, RgbImage};
//! use imageproc::drawing::draw_filled_circle_mut;
//! use panelbot_hal::CameraModel;
//! use panelbot_perception::{LocalizationPipeline, ValveConfig};
//!
//! let mut frame = RgbImage::from_pixel(200, 200, Rgb([220, 220, 220]));
//! draw_filled_circle_mut(&mut frame, (100, 100), 30, Rgb([20, 20, 20]));
//!
//! let camera = CameraModel::new(1.5708, 1.5708, 200, 200).unwrap();
//! let pipeline = LocalizationPipeline::valve(camera, ValveConfig::default());
//! let detection = pipeline.analyze(&frame, 0.5).unwrap();
//! assert!(detection.estimate.offset.y.abs() < 0.02);
//! ```

use image::RgbImage;
use panelbot_hal::CameraModel;
use panelbot_types::{ObjectClass, PanelError, Pixel, Vec3};
use serde::Serialize;
use tracing::debug;

use crate::error::LocalizeError;
use crate::valve::{ValveConfig, ValveSelector};
use crate::wrench::{WrenchConfig, WrenchSelector};

// ─────────────────────────────────────────────────────────────────────────────
// Data model
// ─────────────────────────────────────────────────────────────────────────────

/// One scored candidate object in a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: usize,
    /// Contour centroid for wrenches, circle centre for valves.
    pub centroid: Pixel,
    /// Pixel that is back-projected when this candidate is chosen.
    pub anchor: Pixel,
    /// Radius drawn by the annotator.
    pub radius: f64,
    /// Bounding-box height (pixels).
    pub length: f64,
    /// Bounding-box width (pixels).
    pub width: f64,
    /// Contour area (pixels²).
    pub area: f64,
    /// Circle-size feature: the mean Hough radius of the wrench's circle
    /// cluster, or the valve circle's diameter.
    pub diameter: f64,
    /// Raw vote score, `>= 0`.
    pub score: f64,
}

/// A selector's verdict on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    /// Index into `candidates`.
    pub chosen: usize,
}

/// 3-D position estimate of the chosen candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectEstimate {
    /// `(standoff, y, z)` in meters relative to the end effector.
    pub offset: Vec3,
    /// The back-projected pixel.
    pub pixel: Pixel,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// Full result of a successful frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    pub estimate: ObjectEstimate,
    pub candidates: Vec<Candidate>,
    pub chosen: usize,
}

impl Detection {
    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.chosen)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CandidateSelector
// ─────────────────────────────────────────────────────────────────────────────

/// Object-specific candidate extraction and choice.
pub trait CandidateSelector: Send + Sync {
    fn class(&self) -> ObjectClass;

    /// Extract candidates from `frame` and choose one.
    fn select(&self, frame: &RgbImage) -> Result<Selection, LocalizeError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// LocalizationPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Camera model plus a candidate selector.
pub struct LocalizationPipeline {
    camera: CameraModel,
    selector: Box<dyn CandidateSelector>,
}

impl LocalizationPipeline {
    pub fn new(camera: CameraModel, selector: Box<dyn CandidateSelector>) -> Self {
        Self { camera, selector }
    }

    /// Wrench pipeline with the given tuning.
    ///
    /// # Errors
    ///
    /// [`PanelError::InvalidConfig`] when the configuration is unusable.
    pub fn wrench(camera: CameraModel, config: WrenchConfig) -> Result<Self, PanelError> {
        Ok(Self::new(camera, Box::new(WrenchSelector::new(config)?)))
    }

    pub fn valve(camera: CameraModel, config: ValveConfig) -> Self {
        Self::new(camera, Box::new(ValveSelector::new(config)))
    }

    pub fn class(&self) -> ObjectClass {
        self.selector.class()
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Localize the configured object in `frame` at forward distance
    /// `standoff` meters.
    pub fn analyze(&self, frame: &RgbImage, standoff: f64) -> Result<Detection, LocalizeError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(LocalizeError::EmptyFrame);
        }
        if !standoff.is_finite() || standoff <= 0.0 {
            return Err(LocalizeError::InvalidStandoff(standoff));
        }

        let Selection { candidates, chosen } = self.selector.select(frame)?;
        let Some(best) = candidates.get(chosen) else {
            return Err(LocalizeError::NoCircles);
        };

        let offset = self.camera.back_project(best.anchor, standoff);
        debug!(
            class = %self.class(),
            candidates = candidates.len(),
            chosen,
            col = best.anchor.x,
            row = best.anchor.y,
            y = offset.y,
            z = offset.z,
            "object localized"
        );
        let estimate = ObjectEstimate {
            offset,
            pixel: best.anchor,
            confidence: best.score.clamp(0.0, 1.0),
        };
        Ok(Detection {
            class: self.class(),
            estimate,
            candidates,
            chosen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSelector(Vec<Candidate>, usize);

    impl CandidateSelector for FixedSelector {
        fn class(&self) -> ObjectClass {
            ObjectClass::Wrench
        }

        fn select(&self, _frame: &RgbImage) -> Result<Selection, LocalizeError> {
            if self.0.is_empty() {
                return Err(LocalizeError::NoCircles);
            }
            Ok(Selection {
                candidates: self.0.clone(),
                chosen: self.1,
            })
        }
    }

    fn candidate(id: usize, col: f64, row: f64, score: f64) -> Candidate {
        Candidate {
            id,
            centroid: Pixel::new(col, row + 50.0),
            anchor: Pixel::new(col, row),
            radius: 10.0,
            length: 100.0,
            width: 20.0,
            area: 1500.0,
            diameter: 10.0,
            score,
        }
    }

    fn camera() -> CameraModel {
        CameraModel::new(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2, 100, 100)
            .unwrap()
    }

    #[test]
    fn chosen_anchor_is_back_projected() {
        let sel = FixedSelector(vec![candidate(0, 10.0, 10.0, 0.2), candidate(1, 50.0, 25.0, 0.8)], 1);
        let pipeline = LocalizationPipeline::new(camera(), Box::new(sel));
        let det = pipeline.analyze(&RgbImage::new(100, 100), 2.0).unwrap();
        // tan(pi/4) = 1, so the half extent equals the standoff.
        assert!((det.estimate.offset.x - 2.0).abs() < 1e-12);
        assert!(det.estimate.offset.y.abs() < 1e-9);
        assert!((det.estimate.offset.z - 1.0).abs() < 1e-9);
        assert_eq!(det.estimate.pixel, Pixel::new(50.0, 25.0));
        assert!((det.estimate.confidence - 0.8).abs() < 1e-12);
        assert_eq!(det.chosen_candidate().map(|c| c.id), Some(1));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let sel = FixedSelector(vec![candidate(0, 1.0, 1.0, 1.0)], 0);
        let pipeline = LocalizationPipeline::new(camera(), Box::new(sel));
        assert_eq!(
            pipeline.analyze(&RgbImage::new(0, 0), 1.0),
            Err(LocalizeError::EmptyFrame)
        );
    }

    #[test]
    fn non_positive_standoff_is_rejected() {
        let sel = FixedSelector(vec![candidate(0, 1.0, 1.0, 1.0)], 0);
        let pipeline = LocalizationPipeline::new(camera(), Box::new(sel));
        assert!(matches!(
            pipeline.analyze(&RgbImage::new(10, 10), 0.0),
            Err(LocalizeError::InvalidStandoff(_))
        ));
    }

    #[test]
    fn selector_errors_pass_through() {
        let pipeline = LocalizationPipeline::new(camera(), Box::new(FixedSelector(Vec::new(), 0)));
        assert_eq!(
            pipeline.analyze(&RgbImage::new(10, 10), 1.0),
            Err(LocalizeError::NoCircles)
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let sel = FixedSelector(vec![candidate(0, 50.0, 50.0, 3.0)], 0);
        let pipeline = LocalizationPipeline::new(camera(), Box::new(sel));
        let det = pipeline.analyze(&RgbImage::new(100, 100), 1.0).unwrap();
        assert_eq!(det.estimate.confidence, 1.0);
    }
}
