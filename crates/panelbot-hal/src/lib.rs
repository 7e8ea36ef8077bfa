//! `panelbot-hal` – hardware boundary of the panel task.
//!
//! Everything the task sequencer needs from the physical robot is expressed
//! as a trait here, so drivers can be swapped without touching perception or
//! orchestration logic.
//!
//! # Modules
//!
//! - [`camera`] – [`CameraModel`][camera::CameraModel]: fixed field-of-view
//!   pinhole model used to back-project pixels at a known standoff, and the
//!   [`FrameSource`][camera::FrameSource] trait delivering RGB frames.
//! - [`motion`] – [`MotionInterface`][motion::MotionInterface]: blocking
//!   motion commands that report arrival, stuck or failure.
//! - [`file_source`] – [`FileFrameSource`][file_source::FileFrameSource]:
//!   replays image files from a directory as camera frames.
//! - [`sim`] – scripted in-process drivers for headless runs and tests.

pub mod camera;
pub mod file_source;
pub mod motion;
pub mod sim;

pub use camera::{CameraConfig, CameraModel, FrameSource};
pub use file_source::FileFrameSource;
pub use motion::{MotionCommand, MotionInterface, MotionReport, NamedPose};
pub use sim::{SimArm, SimFrameSource};
