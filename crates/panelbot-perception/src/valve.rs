//! Valve candidate selection and centering.
//!
//! The valve stem is the left-most circle in a median-blurred grayscale
//! frame.  [`assess_centering`] then decides whether the arm is close
//! enough to the valve axis or must be nudged by a fraction of the measured
//! offset.

use image::{RgbImage, imageops};
use imageproc::filter::median_filter;
use panelbot_types::{ObjectClass, Pixel, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::LocalizeError;
use crate::hough::{HoughParams, detect_circles};
use crate::pipeline::{Candidate, CandidateSelector, Selection};

/// Share of the measured lateral/vertical offset applied per centering step.
pub const DEFAULT_CENTERING_FRACTION: f64 = 0.25;

/// Offset norm (meters) under which the valve counts as centred.
pub const DEFAULT_CENTERED_TOLERANCE: f64 = 0.01;

/// Distance (meters) kept between end effector and valve while servoing.
pub const DEFAULT_VALVE_STANDOFF: f64 = 0.5;

/// Tuning of the valve circle search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveConfig {
    #[serde(default = "default_median_size")]
    pub median_size: u32,
    #[serde(default = "default_canny_high")]
    pub canny_high: f32,
    #[serde(default = "default_accumulator_threshold")]
    pub accumulator_threshold: u32,
    #[serde(default = "default_min_dist")]
    pub min_dist: f64,
    #[serde(default = "default_min_radius")]
    pub min_radius: u32,
    #[serde(default = "default_max_radius")]
    pub max_radius: u32,
}

fn default_median_size() -> u32 {
    5
}
fn default_canny_high() -> f32 {
    50.0
}
fn default_accumulator_threshold() -> u32 {
    30
}
fn default_min_dist() -> f64 {
    20.0
}
fn default_min_radius() -> u32 {
    10
}
fn default_max_radius() -> u32 {
    500
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            median_size: default_median_size(),
            canny_high: default_canny_high(),
            accumulator_threshold: default_accumulator_threshold(),
            min_dist: default_min_dist(),
            min_radius: default_min_radius(),
            max_radius: default_max_radius(),
        }
    }
}

/// Picks the left-most detected circle.
#[derive(Debug, Clone, Default)]
pub struct ValveSelector {
    config: ValveConfig,
}

impl ValveSelector {
    pub fn new(config: ValveConfig) -> Self {
        Self { config }
    }
}

impl CandidateSelector for ValveSelector {
    fn class(&self) -> ObjectClass {
        ObjectClass::Valve
    }

    fn select(&self, frame: &RgbImage) -> Result<Selection, LocalizeError> {
        let cfg = &self.config;
        let radius = cfg.median_size / 2;
        let gray = median_filter(&imageops::grayscale(frame), radius, radius);

        let params = HoughParams {
            canny_high: cfg.canny_high,
            accumulator_threshold: cfg.accumulator_threshold,
            min_dist: cfg.min_dist,
            min_radius: cfg.min_radius,
            max_radius: cfg.max_radius,
        };
        let mut circles = detect_circles(&gray, &params);
        if circles.is_empty() {
            return Err(LocalizeError::NoCircles);
        }
        circles.sort_by(|a, b| a.x.total_cmp(&b.x));

        let candidates = circles
            .iter()
            .enumerate()
            .map(|(id, c)| {
                let centre = Pixel::new(c.x, c.y);
                Candidate {
                    id,
                    centroid: centre,
                    anchor: centre,
                    radius: c.radius,
                    length: 2.0 * c.radius,
                    width: 2.0 * c.radius,
                    area: std::f64::consts::PI * c.radius * c.radius,
                    diameter: 2.0 * c.radius,
                    score: if id == 0 { 1.0 } else { 0.0 },
                }
            })
            .collect();
        Ok(Selection { candidates, chosen: 0 })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Centering
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of [`assess_centering`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenteringConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_fraction")]
    pub fraction: f64,
    #[serde(default = "default_standoff")]
    pub standoff: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_CENTERED_TOLERANCE
}
fn default_fraction() -> f64 {
    DEFAULT_CENTERING_FRACTION
}
fn default_standoff() -> f64 {
    DEFAULT_VALVE_STANDOFF
}

impl Default for CenteringConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_CENTERED_TOLERANCE,
            fraction: DEFAULT_CENTERING_FRACTION,
            standoff: DEFAULT_VALVE_STANDOFF,
        }
    }
}

/// Outcome of one centering check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValveCentering {
    Centered {
        error: f64,
    },
    /// The valve target and the end-effector goal to write back.
    OffCenter {
        error: f64,
        valve: Vec3,
        ee_position: Vec3,
    },
}

/// Compare the measured `offset` against the tolerance and, when off
/// centre, shift the stored `valve` target by `fraction · (0, y, z)`.
pub fn assess_centering(offset: Vec3, valve: Vec3, config: &CenteringConfig) -> ValveCentering {
    let error = offset.y.hypot(offset.z);
    if error < config.tolerance {
        return ValveCentering::Centered { error };
    }
    let valve = valve.add(Vec3::new(0.0, offset.y, offset.z).scale(config.fraction));
    let ee_position = valve.sub(Vec3::new(config.standoff, 0.0, 0.0));
    ValveCentering::OffCenter {
        error,
        valve,
        ee_position,
    }
}
