//! Task-level tuning: retry bounds, perception budgets and motion geometry.

use panelbot_perception::valve::{
    CenteringConfig, DEFAULT_CENTERED_TOLERANCE, DEFAULT_CENTERING_FRACTION, DEFAULT_VALVE_STANDOFF,
};
use panelbot_types::PanelError;
use serde::{Deserialize, Serialize};

/// Orchestrator and perception-step parameters.
///
/// All distances are meters along the base-frame `x` axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Retries allowed per motion state before `moveStuck` becomes
    /// `moveFailed`.
    #[serde(default = "default_max_move_retries")]
    pub max_move_retries: u32,

    /// IdentifyValve ↔ ServoToValve round trips before giving up.
    #[serde(default = "default_max_servo_iterations")]
    pub max_servo_iterations: u32,

    /// Frames tried per wrench identification.
    #[serde(default = "default_wrench_max_frames")]
    pub wrench_max_frames: u32,

    /// Frames tried per valve identification.
    #[serde(default = "default_valve_max_frames")]
    pub valve_max_frames: u32,

    /// Gap between end effector and wrench at the wrench-ready pose.
    #[serde(default = "default_wrench_standoff")]
    pub wrench_standoff: f64,

    /// Gap left when approaching the wrench, closed by the grasp move.
    #[serde(default = "default_grasp_clearance")]
    pub grasp_clearance: f64,

    /// Gap between end effector and valve while servoing.
    #[serde(default = "default_valve_standoff")]
    pub valve_standoff: f64,

    /// Gap between end effector and valve when engaging it with the wrench.
    #[serde(default = "default_operate_clearance")]
    pub operate_clearance: f64,

    /// Wrist rotation applied to turn the valve (radians).
    #[serde(default = "default_valve_turn_angle")]
    pub valve_turn_angle: f64,

    #[serde(default = "default_centering_fraction")]
    pub centering_fraction: f64,

    #[serde(default = "default_centered_tolerance")]
    pub centered_tolerance: f64,
}

fn default_max_move_retries() -> u32 {
    1
}
fn default_max_servo_iterations() -> u32 {
    10
}
fn default_wrench_max_frames() -> u32 {
    100
}
fn default_valve_max_frames() -> u32 {
    1
}
fn default_wrench_standoff() -> f64 {
    0.4
}
fn default_grasp_clearance() -> f64 {
    0.1
}
fn default_valve_standoff() -> f64 {
    DEFAULT_VALVE_STANDOFF
}
fn default_operate_clearance() -> f64 {
    0.05
}
fn default_valve_turn_angle() -> f64 {
    std::f64::consts::FRAC_PI_2
}
fn default_centering_fraction() -> f64 {
    DEFAULT_CENTERING_FRACTION
}
fn default_centered_tolerance() -> f64 {
    DEFAULT_CENTERED_TOLERANCE
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_move_retries: default_max_move_retries(),
            max_servo_iterations: default_max_servo_iterations(),
            wrench_max_frames: default_wrench_max_frames(),
            valve_max_frames: default_valve_max_frames(),
            wrench_standoff: default_wrench_standoff(),
            grasp_clearance: default_grasp_clearance(),
            valve_standoff: default_valve_standoff(),
            operate_clearance: default_operate_clearance(),
            valve_turn_angle: default_valve_turn_angle(),
            centering_fraction: default_centering_fraction(),
            centered_tolerance: default_centered_tolerance(),
        }
    }
}

impl TaskConfig {
    /// Reject negative distances and out-of-range fractions.
    pub fn validate(&self) -> Result<(), PanelError> {
        let distances = [
            ("wrench_standoff", self.wrench_standoff),
            ("grasp_clearance", self.grasp_clearance),
            ("valve_standoff", self.valve_standoff),
            ("operate_clearance", self.operate_clearance),
            ("centered_tolerance", self.centered_tolerance),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(PanelError::InvalidConfig(format!(
                    "task.{name} must be a non-negative distance, got {value}"
                )));
            }
        }
        if !(self.centering_fraction > 0.0 && self.centering_fraction <= 1.0) {
            return Err(PanelError::InvalidConfig(format!(
                "task.centering_fraction {} outside (0, 1]",
                self.centering_fraction
            )));
        }
        Ok(())
    }

    pub fn centering(&self) -> CenteringConfig {
        CenteringConfig {
            tolerance: self.centered_tolerance,
            fraction: self.centering_fraction,
            standoff: self.valve_standoff,
        }
    }
}
