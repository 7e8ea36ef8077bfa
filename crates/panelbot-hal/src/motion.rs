//! Generic `MotionInterface` trait for the arm, gripper and mobile base.
//!
//! Orchestrator motion states issue one [`MotionCommand`] and block until the
//! external motion system reports how it ended.  The transport behind a
//! driver (action server, serial link, simulator) is invisible to callers.

use panelbot_types::{PanelError, Vec3};
use serde::{Deserialize, Serialize};

/// Arm configurations known to the motion system by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedPose {
    /// Arm raised in front of the panel, clear of the tools.
    Ready,
    /// Arm folded onto the base for driving.
    Stow,
}

/// A single blocking request to the motion system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Move the arm to a named configuration.
    MoveToPose(NamedPose),
    /// Move the end effector to a position in the base frame.
    MoveEndEffector(Vec3),
    /// Drive the mobile base until `target` is within arm's reach.
    DriveBase(Vec3),
    /// Rotate the base in place until it squarely faces the panel.
    AlignBase,
    /// Open or close the gripper.
    Gripper { closed: bool },
    /// Rotate the wrist by `radians` while holding the current position.
    RotateWrist { radians: f64 },
}

/// How a [`MotionCommand`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionReport {
    /// The commanded target was reached.
    Arrived,
    /// Motion stopped short of the target; retrying may succeed.
    Stuck,
    /// The motion system rejected or aborted the command.
    Failed,
    /// The gripper lost the object it was holding.
    PayloadLost,
}

/// The robot's motion system.
pub trait MotionInterface: Send {
    /// Stable identifier for this backend, e.g. `"ur5_arm"`.
    fn id(&self) -> &str;

    /// Execute `command` and block until the motion system reports back.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::HardwareFault`] when the command cannot be
    /// delivered at all (e.g. the controller is disconnected).
    fn execute(&mut self, command: &MotionCommand) -> Result<MotionReport, PanelError>;
}
