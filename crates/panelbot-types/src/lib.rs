//! `panelbot-types` – shared vocabulary for the panelbot workspace.
//!
//! Plain value types exchanged between the hardware layer, the shared state
//! store, the perception pipeline and the task orchestrator, plus the
//! workspace-wide [`PanelError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in meters.
///
/// Positions use the robot base frame: `x` forward, `y` left, `z` up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// A pixel coordinate in image space (`x` = column, `y` = row), sub-pixel
/// precision allowed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Objects and perception status
// ─────────────────────────────────────────────────────────────────────────────

/// The kinds of object the perception pipeline can localize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Wrench,
    Valve,
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectClass::Wrench => write!(f, "wrench"),
            ObjectClass::Valve => write!(f, "valve"),
        }
    }
}

/// Result tag of the most recently completed perception step.
///
/// Written to the shared state store under the `status` key; the
/// orchestrator reads it right after invoking the step that wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerceptionStatus {
    /// The valve sits within the centering tolerance of the optical axis.
    ValveCentered,
    /// The valve was found but the arm must be nudged toward it.
    ValveOffCenter,
    ValveNotFound,
    WrenchFound,
    WrenchNotFound,
    /// The step was cancelled before producing a result.  Never a success.
    Aborted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning hardware faults, shared-state access and
/// configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelError {
    #[error("Shared state key not found: {0}")]
    MissingKey(String),

    #[error("Shared state key {key} does not hold a {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Invalid camera model: {0}")]
    InvalidCamera(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(0.5, -1.0, 1.0);
        assert_eq!(a.add(b), Vec3::new(1.5, 1.0, 4.0));
        assert_eq!(a.sub(b), Vec3::new(0.5, 3.0, 2.0));
        assert_eq!(b.scale(2.0), Vec3::new(1.0, -2.0, 2.0));
    }

    #[test]
    fn status_uses_camel_case_tags() {
        let json = serde_json::to_string(&PerceptionStatus::ValveOffCenter).unwrap();
        assert_eq!(json, "\"valveOffCenter\"");
        let back: PerceptionStatus = serde_json::from_str("\"wrenchNotFound\"").unwrap();
        assert_eq!(back, PerceptionStatus::WrenchNotFound);
    }

    #[test]
    fn object_class_display_matches_serde() {
        assert_eq!(ObjectClass::Wrench.to_string(), "wrench");
        let json = serde_json::to_string(&ObjectClass::Valve).unwrap();
        assert_eq!(json, "\"valve\"");
    }

    #[test]
    fn panel_error_display() {
        let err = PanelError::MissingKey("ee_position".to_string());
        assert!(err.to_string().contains("ee_position"));

        let err2 = PanelError::HardwareFault {
            component: "arm".to_string(),
            details: "overcurrent".to_string(),
        };
        assert!(err2.to_string().contains("arm"));
    }
}
