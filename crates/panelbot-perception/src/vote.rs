//! Multi-criteria voting over wrench candidates.
//!
//! Each feature (circle size, length, area) is scored with a Gaussian
//! likelihood normalized by its peak, so a feature equal to the calibrated
//! mean scores exactly 1.0.  The composite score is the weighted sum.
//!
//! | Feature  | Mean  | Sigma |
//! |----------|-------|-------|
//! | diameter | 22.9  | 3.8   |
//! | length   | 417   | 14.0  |
//! | area     | 13074 | 1048  |

use serde::{Deserialize, Serialize};

/// A Gaussian likelihood for one scalar feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianCriterion {
    pub mean: f64,
    pub sigma: f64,
}

impl GaussianCriterion {
    pub const fn new(mean: f64, sigma: f64) -> Self {
        Self { mean, sigma }
    }

    /// Probability density at `x`.
    pub fn density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sigma;
        (-0.5 * z * z).exp() / (self.sigma * (2.0 * std::f64::consts::PI).sqrt())
    }

    /// Density at `x` divided by the density at the mean; in `(0, 1]`.
    pub fn normalized(&self, x: f64) -> f64 {
        self.density(x) / self.density(self.mean)
    }
}

/// Calibrated feature distributions and their weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteCalibration {
    #[serde(default = "default_diameter")]
    pub diameter: GaussianCriterion,
    #[serde(default = "default_length")]
    pub length: GaussianCriterion,
    #[serde(default = "default_area")]
    pub area: GaussianCriterion,
    /// Weights of diameter, length and area, in that order.
    #[serde(default = "default_weights")]
    pub weights: [f64; 3],
}

fn default_diameter() -> GaussianCriterion {
    GaussianCriterion::new(22.9, 3.8)
}

fn default_length() -> GaussianCriterion {
    GaussianCriterion::new(417.0, 14.0)
}

fn default_area() -> GaussianCriterion {
    GaussianCriterion::new(13074.0, 1048.0)
}

fn default_weights() -> [f64; 3] {
    [1.0 / 3.0; 3]
}

impl Default for VoteCalibration {
    fn default() -> Self {
        Self {
            diameter: default_diameter(),
            length: default_length(),
            area: default_area(),
            weights: default_weights(),
        }
    }
}

impl VoteCalibration {
    /// Reject non-positive sigmas and weights that are negative or do not
    /// sum to 1.
    pub fn validate(&self) -> Result<(), String> {
        for (name, c) in [
            ("diameter", &self.diameter),
            ("length", &self.length),
            ("area", &self.area),
        ] {
            if c.sigma.is_nan() || c.sigma <= 0.0 || !c.mean.is_finite() {
                return Err(format!("{name} criterion needs a finite mean and positive sigma"));
            }
        }
        if self.weights.iter().any(|w| *w < 0.0) {
            return Err("vote weights must be non-negative".to_string());
        }
        let sum: f64 = self.weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("vote weights sum to {sum}, expected 1"));
        }
        Ok(())
    }

    /// Normalized per-feature scores.
    pub fn feature_scores(&self, diameter: f64, length: f64, area: f64) -> [f64; 3] {
        [
            self.diameter.normalized(diameter),
            self.length.normalized(length),
            self.area.normalized(area),
        ]
    }

    /// Weighted sum of the per-feature scores.
    pub fn composite(&self, diameter: f64, length: f64, area: f64) -> f64 {
        self.feature_scores(diameter, length, area)
            .iter()
            .zip(self.weights)
            .map(|(s, w)| s * w)
            .sum()
    }
}

/// Index of the highest score; the first one wins ties.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if best.is_none_or(|(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}
