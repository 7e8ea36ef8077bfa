//! In-process simulation drivers for CI/CD testing without physical hardware.
//!
//! [`SimArm`] records every [`MotionCommand`] and answers from a script of
//! [`MotionReport`]s (defaulting to [`MotionReport::Arrived`] once the script
//! runs dry).  [`SimFrameSource`] replays a fixed list of frames.
//!
//! # Example
//!
//! ```rust
//! use panelbot_hal::motion::{MotionCommand, MotionInterface, MotionReport, NamedPose};
//! use panelbot_hal::sim::SimArm;
//!
//! let mut arm = SimArm::new("sim_arm").with_script([MotionReport::Stuck]);
//! let cmd = MotionCommand::MoveToPose(NamedPose::Ready);
//! assert_eq!(arm.execute(&cmd).unwrap(), MotionReport::Stuck);
//! assert_eq!(arm.execute(&cmd).unwrap(), MotionReport::Arrived);
//! assert_eq!(arm.history().len(), 2);
//! ```

use std::collections::VecDeque;

use image::RgbImage;
use panelbot_types::PanelError;
use tracing::debug;

use crate::camera::FrameSource;
use crate::motion::{MotionCommand, MotionInterface, MotionReport};

// ────────────────────────────────────────────────────────────────────────────
// Scripted arm
// ────────────────────────────────────────────────────────────────────────────

/// A simulated motion backend that records commands and replays a script of
/// reports.
pub struct SimArm {
    id: String,
    script: VecDeque<MotionReport>,
    history: Vec<MotionCommand>,
    fault: Option<String>,
}

impl SimArm {
    /// Create a new simulated arm that arrives at every target.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: VecDeque::new(),
            history: Vec::new(),
            fault: None,
        }
    }

    /// Queue reports to return, in order, before falling back to `Arrived`.
    pub fn with_script(mut self, reports: impl IntoIterator<Item = MotionReport>) -> Self {
        self.script.extend(reports);
        self
    }

    /// Make every subsequent command fail with a hardware fault.
    pub fn with_fault(mut self, details: impl Into<String>) -> Self {
        self.fault = Some(details.into());
        self
    }

    /// Every command received so far, oldest first.
    pub fn history(&self) -> &[MotionCommand] {
        &self.history
    }
}

impl MotionInterface for SimArm {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&mut self, command: &MotionCommand) -> Result<MotionReport, PanelError> {
        self.history.push(command.clone());
        if let Some(details) = &self.fault {
            return Err(PanelError::HardwareFault {
                component: self.id.clone(),
                details: details.clone(),
            });
        }
        let report = self.script.pop_front().unwrap_or(MotionReport::Arrived);
        debug!(arm = %self.id, ?command, ?report, "sim motion");
        Ok(report)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame replay
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that replays a list of frames.
///
/// Once the list is exhausted it either wraps around (`cycle`) or reports a
/// hardware fault on every further capture.
pub struct SimFrameSource {
    id: String,
    frames: Vec<RgbImage>,
    next: usize,
    cycle: bool,
}

impl SimFrameSource {
    /// Replay `frames` once.
    pub fn new(id: impl Into<String>, frames: Vec<RgbImage>) -> Self {
        Self {
            id: id.into(),
            frames,
            next: 0,
            cycle: false,
        }
    }

    /// Wrap around to the first frame after the last one.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Number of frames handed out so far.
    pub fn captured(&self) -> usize {
        self.next
    }
}

impl FrameSource for SimFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<RgbImage, PanelError> {
        if self.frames.is_empty() || (!self.cycle && self.next >= self.frames.len()) {
            return Err(PanelError::HardwareFault {
                component: self.id.clone(),
                details: "no more frames".to_string(),
            });
        }
        let frame = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        Ok(frame)
    }
}
