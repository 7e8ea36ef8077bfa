//! Wrench candidate selection.
//!
//! Runs the full chain: occlusion crop, contrast stretch, background
//! suppression, segmentation, Hough circles on the upper part of the frame,
//! k-means over the circle centres, contour geometry and Gaussian voting.
//! Circle clusters and contours are both sorted by `x` and paired by index,
//! so the i-th head belongs to the i-th wrench body.

use image::{RgbImage, imageops};
use panelbot_types::{ObjectClass, PanelError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::cluster_circles;
use crate::error::LocalizeError;
use crate::geometry::extract_geometry;
use crate::hough::{HoughParams, detect_circles};
use crate::pipeline::{Candidate, CandidateSelector, Selection};
use crate::preprocess::{
    StretchMode, adjust_contrast, crop_occlusions, stretch_limits, suppress_background,
};
use crate::segment::segment;
use crate::vote::{VoteCalibration, select_best};

const KMEANS_MAX_ITER: usize = 30;
const KMEANS_EPS: f64 = 0.1;

/// Tuning of the wrench pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrenchConfig {
    /// Number of wrenches on the board.
    #[serde(default = "default_expected_count")]
    pub expected_count: usize,

    /// Share of rows kept from the top of the frame.
    #[serde(default = "default_keep_fraction")]
    pub keep_fraction: f64,

    /// Canny thresholds for the board-edge crop, and
    /// `[canny_high, accumulator_threshold]` for circle detection.
    #[serde(default = "default_canny_param")]
    pub canny_param: [f32; 2],

    /// Share of the cropped height a column's edge count must reach to be
    /// treated as the board frame.
    #[serde(default = "default_box_edge_fraction")]
    pub box_edge_fraction: f64,

    #[serde(default)]
    pub stretch_mode: StretchMode,

    #[serde(default = "default_median_size")]
    pub median_size: u32,

    #[serde(default = "default_segment_area_threshold")]
    pub segment_area_threshold: u32,

    #[serde(default = "default_segment_kernel_size")]
    pub segment_kernel_size: u32,

    /// Contours with this area or less are ignored.
    #[serde(default = "default_area_min_thresh")]
    pub area_min_thresh: f64,

    /// Largest circle diameter considered (pixels).
    #[serde(default = "default_max_circ_diam")]
    pub max_circ_diam: u32,

    /// Circles are searched in the top `1 / p2crop` of the frame.
    #[serde(default = "default_p2crop")]
    pub p2crop: u32,

    #[serde(default)]
    pub vote: VoteCalibration,
}

fn default_expected_count() -> usize {
    6
}
fn default_keep_fraction() -> f64 {
    69.0 / 96.0
}
fn default_canny_param() -> [f32; 2] {
    [100.0, 30.0]
}
fn default_box_edge_fraction() -> f64 {
    0.9
}
fn default_median_size() -> u32 {
    3
}
fn default_segment_area_threshold() -> u32 {
    30
}
fn default_segment_kernel_size() -> u32 {
    8
}
fn default_area_min_thresh() -> f64 {
    3000.0
}
fn default_max_circ_diam() -> u32 {
    200
}
fn default_p2crop() -> u32 {
    2
}

impl Default for WrenchConfig {
    fn default() -> Self {
        Self {
            expected_count: default_expected_count(),
            keep_fraction: default_keep_fraction(),
            canny_param: default_canny_param(),
            box_edge_fraction: default_box_edge_fraction(),
            stretch_mode: StretchMode::default(),
            median_size: default_median_size(),
            segment_area_threshold: default_segment_area_threshold(),
            segment_kernel_size: default_segment_kernel_size(),
            area_min_thresh: default_area_min_thresh(),
            max_circ_diam: default_max_circ_diam(),
            p2crop: default_p2crop(),
            vote: VoteCalibration::default(),
        }
    }
}

impl WrenchConfig {
    pub fn validate(&self) -> Result<(), PanelError> {
        let invalid = |msg: String| Err(PanelError::InvalidConfig(format!("wrench: {msg}")));
        if self.expected_count == 0 {
            return invalid("expected_count must be positive".into());
        }
        if !(self.keep_fraction > 0.0 && self.keep_fraction <= 1.0) {
            return invalid(format!("keep_fraction {} outside (0, 1]", self.keep_fraction));
        }
        if self.p2crop == 0 {
            return invalid("p2crop must be positive".into());
        }
        if self.max_circ_diam < 4 {
            return invalid("max_circ_diam must be at least 4".into());
        }
        self.vote.validate().or_else(invalid)
    }

    fn hough_params(&self) -> HoughParams {
        HoughParams {
            canny_high: self.canny_param[0],
            accumulator_threshold: self.canny_param[1].max(0.0) as u32,
            min_dist: 1.0,
            min_radius: 1,
            max_radius: self.max_circ_diam / 2,
        }
    }
}

/// Chooses the wrench whose geometry best matches the vote calibration.
#[derive(Debug, Clone)]
pub struct WrenchSelector {
    config: WrenchConfig,
}

impl WrenchSelector {
    pub fn new(config: WrenchConfig) -> Result<Self, PanelError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WrenchConfig {
        &self.config
    }
}

impl CandidateSelector for WrenchSelector {
    fn class(&self) -> ObjectClass {
        ObjectClass::Wrench
    }

    fn select(&self, frame: &RgbImage) -> Result<Selection, LocalizeError> {
        let cfg = &self.config;
        let n = cfg.expected_count;

        let cropped = crop_occlusions(frame, cfg.keep_fraction, cfg.canny_param, cfg.box_edge_fraction);
        let limits = stretch_limits(&cropped, cfg.stretch_mode);
        let flattened = suppress_background(&adjust_contrast(&cropped, &limits));
        let seg = segment(
            &flattened,
            cfg.median_size,
            cfg.segment_area_threshold,
            cfg.segment_kernel_size,
        );

        let (w, h) = seg.gray.dimensions();
        let top = imageops::crop_imm(&seg.gray, 0, 0, w, (h / cfg.p2crop).max(1)).to_image();
        let circles = detect_circles(&top, &cfg.hough_params());
        debug!(width = w, height = h, circles = circles.len(), "wrench circles detected");
        if circles.is_empty() {
            return Err(LocalizeError::NoCircles);
        }

        let clusters = cluster_circles(&circles, n, KMEANS_MAX_ITER, KMEANS_EPS)?;
        let shapes = extract_geometry(&seg.binary, cfg.area_min_thresh, n)?;

        let candidates: Vec<Candidate> = clusters
            .iter()
            .zip(&shapes)
            .enumerate()
            .map(|(id, (cluster, shape))| Candidate {
                id,
                centroid: shape.centroid,
                anchor: cluster.center,
                radius: cluster.mean_radius,
                length: shape.length,
                width: shape.width,
                area: shape.area,
                diameter: cluster.mean_radius,
                score: cfg.vote.composite(cluster.mean_radius, shape.length, shape.area),
            })
            .collect();

        let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        let chosen = select_best(&scores).ok_or(LocalizeError::NoCircles)?;
        debug!(chosen, score = scores[chosen], "wrench candidate chosen");
        Ok(Selection { candidates, chosen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::GaussianCriterion;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const BAR_LENGTHS: [u32; 6] = [80, 95, 110, 125, 140, 155];

    /// Six dark wrenches (a round head on a vertical bar) on a light board.
    fn board() -> RgbImage {
        let mut img = RgbImage::from_pixel(640, 480, Rgb([200, 200, 200]));
        for (i, len) in BAR_LENGTHS.iter().enumerate() {
            let x = 60 + 100 * i as i32;
            draw_filled_circle_mut(&mut img, (x, 60), 12, Rgb([40, 40, 40]));
            draw_filled_rect_mut(&mut img, Rect::at(x - 6, 60).of_size(12, *len), Rgb([40, 40, 40]));
        }
        img
    }

    fn config() -> WrenchConfig {
        WrenchConfig {
            canny_param: [100.0, 15.0],
            area_min_thresh: 300.0,
            max_circ_diam: 60,
            vote: VoteCalibration {
                diameter: GaussianCriterion::new(12.0, 1000.0),
                // Bar plus the part of the head above it.
                length: GaussianCriterion::new(110.0 + 12.0, 5.0),
                area: GaussianCriterion::new(2000.0, 1.0e6),
                weights: [0.0, 1.0, 0.0],
            },
            ..WrenchConfig::default()
        }
    }

    #[test]
    fn heads_and_bodies_pair_left_to_right() {
        let selector = WrenchSelector::new(config()).unwrap();
        let selection = selector.select(&board()).unwrap();
        assert_eq!(selection.candidates.len(), 6);
        for (i, c) in selection.candidates.iter().enumerate() {
            let x = 60.0 + 100.0 * i as f64;
            assert!((c.anchor.x - x).abs() < 5.0, "head {i} at {}", c.anchor.x);
            assert!((c.centroid.x - x).abs() < 5.0, "body {i} at {}", c.centroid.x);
        }
    }

    #[test]
    fn length_calibration_picks_matching_wrench() {
        let selector = WrenchSelector::new(config()).unwrap();
        let selection = selector.select(&board()).unwrap();
        assert_eq!(selection.chosen, 2);
    }

    #[test]
    fn blank_board_has_no_candidates() {
        let selector = WrenchSelector::new(config()).unwrap();
        let blank = RgbImage::from_pixel(320, 240, Rgb([200, 200, 200]));
        assert!(selector.select(&blank).is_err());
    }

    #[test]
    fn fewer_wrenches_than_expected_is_not_found() {
        let selector = WrenchSelector::new(config()).unwrap();
        let mut img = RgbImage::from_pixel(640, 480, Rgb([200, 200, 200]));
        for i in 0..3 {
            let x = 60 + 100 * i;
            draw_filled_circle_mut(&mut img, (x, 60), 12, Rgb([40, 40, 40]));
            draw_filled_rect_mut(&mut img, Rect::at(x - 6, 60).of_size(12, 100), Rgb([40, 40, 40]));
        }
        assert!(selector.select(&img).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = WrenchConfig {
            p2crop: 0,
            ..WrenchConfig::default()
        };
        assert!(matches!(WrenchSelector::new(cfg), Err(PanelError::InvalidConfig(_))));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: WrenchConfig = serde_json::from_str(r#"{"expected_count": 4}"#).unwrap();
        assert_eq!(cfg.expected_count, 4);
        assert_eq!(cfg.area_min_thresh, 3000.0);
        assert_eq!(cfg.canny_param, [100.0, 30.0]);
    }
}
