//! Perception steps invoked by the IdentifyWrench and IdentifyValve states.
//!
//! A step reads the standoff from the shared state, pulls frames until the
//! pipeline localizes the object or the frame budget runs out, and writes
//! its results back.  The `status` key always receives the step's verdict,
//! which is the only thing the calling state looks at.
//!
//! | Step   | Keys written on success                  | Status                              |
//! |--------|------------------------------------------|-------------------------------------|
//! | wrench | `wrench_id_px`, `wrench_id_m`            | `wrenchFound` / `wrenchNotFound`     |
//! | valve  | `valve_id_m` (+ `valve`, `ee_position`)  | `valveCentered` / `valveOffCenter` / `valveNotFound` |
//!
//! A cancelled step writes `aborted`.

use panelbot_hal::FrameSource;
use panelbot_memory::{SharedState, keys};
use panelbot_perception::valve::{CenteringConfig, ValveCentering, assess_centering};
use panelbot_perception::{Detection, LocalizationPipeline};
use panelbot_types::{ObjectClass, PanelError, PerceptionStatus};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::TaskConfig;

enum FrameSearch {
    Found(Box<Detection>),
    NotFound,
    Aborted,
}

/// Owns the frame source and both localization pipelines.
pub struct PerceptionRunner {
    wrench: LocalizationPipeline,
    valve: LocalizationPipeline,
    frames: Box<dyn FrameSource>,
    state: SharedState,
    cancel: CancelToken,
    wrench_max_frames: u32,
    valve_max_frames: u32,
    centering: CenteringConfig,
}

impl PerceptionRunner {
    pub fn new(
        wrench: LocalizationPipeline,
        valve: LocalizationPipeline,
        frames: Box<dyn FrameSource>,
        state: SharedState,
        cancel: CancelToken,
        config: &TaskConfig,
    ) -> Self {
        Self {
            wrench,
            valve,
            frames,
            state,
            cancel,
            wrench_max_frames: config.wrench_max_frames,
            valve_max_frames: config.valve_max_frames,
            centering: config.centering(),
        }
    }

    /// Forward distance from the end effector to the stored target of
    /// `class`.
    fn standoff(&self, class: ObjectClass) -> Result<f64, PanelError> {
        let target = self.state.target_position(class)?;
        let ee = self.state.ee_position()?;
        Ok(target.x - ee.x)
    }

    fn search(&mut self, class: ObjectClass, standoff: f64, max_frames: u32) -> FrameSearch {
        let pipeline = match class {
            ObjectClass::Wrench => &self.wrench,
            ObjectClass::Valve => &self.valve,
        };
        for attempt in 1..=max_frames.max(1) {
            if self.cancel.is_cancelled() {
                warn!(%class, attempt, "perception step cancelled");
                return FrameSearch::Aborted;
            }
            let frame = match self.frames.capture() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(%class, attempt, source = self.frames.id(), error = %e, "frame capture failed");
                    continue;
                }
            };
            match pipeline.analyze(&frame, standoff) {
                Ok(detection) => {
                    debug!(%class, attempt, "frame accepted");
                    return FrameSearch::Found(Box::new(detection));
                }
                Err(e) => debug!(%class, attempt, reason = %e, "frame rejected"),
            }
        }
        FrameSearch::NotFound
    }

    /// Locate the wrench and record its pixel and metric offset.
    ///
    /// # Errors
    ///
    /// Shared-state failures, including a missing `wrench` or `ee_position`
    /// key.
    pub fn identify_wrench(&mut self) -> Result<PerceptionStatus, PanelError> {
        let standoff = self.standoff(ObjectClass::Wrench)?;
        let status = match self.search(ObjectClass::Wrench, standoff, self.wrench_max_frames) {
            FrameSearch::Found(det) => {
                self.state.set_pixel(keys::WRENCH_ID_PX, det.estimate.pixel)?;
                self.state.set_vec3(keys::WRENCH_ID_M, det.estimate.offset)?;
                info!(
                    y = det.estimate.offset.y,
                    z = det.estimate.offset.z,
                    confidence = det.estimate.confidence,
                    "wrench identified"
                );
                PerceptionStatus::WrenchFound
            }
            FrameSearch::NotFound => PerceptionStatus::WrenchNotFound,
            FrameSearch::Aborted => PerceptionStatus::Aborted,
        };
        self.state.set_status(status)?;
        Ok(status)
    }

    /// Locate the valve, record its offset and update the centering goal.
    ///
    /// # Errors
    ///
    /// Shared-state failures, including a missing `valve` or `ee_position`
    /// key.
    pub fn identify_valve(&mut self) -> Result<PerceptionStatus, PanelError> {
        let standoff = self.standoff(ObjectClass::Valve)?;
        let status = match self.search(ObjectClass::Valve, standoff, self.valve_max_frames) {
            FrameSearch::Found(det) => {
                let offset = det.estimate.offset;
                self.state.set_vec3(keys::VALVE_ID_M, offset)?;
                let valve = self.state.target_position(ObjectClass::Valve)?;
                match assess_centering(offset, valve, &self.centering) {
                    ValveCentering::Centered { error } => {
                        info!(error, "valve centered");
                        PerceptionStatus::ValveCentered
                    }
                    ValveCentering::OffCenter {
                        error,
                        valve,
                        ee_position,
                    } => {
                        self.state.set_target_position(ObjectClass::Valve, valve)?;
                        self.state.set_ee_position(ee_position)?;
                        info!(error, y = offset.y, z = offset.z, "valve off centre");
                        PerceptionStatus::ValveOffCenter
                    }
                }
            }
            FrameSearch::NotFound => PerceptionStatus::ValveNotFound,
            FrameSearch::Aborted => PerceptionStatus::Aborted,
        };
        self.state.set_status(status)?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;
    use panelbot_hal::{CameraModel, SimFrameSource};
    use panelbot_perception::{ValveConfig, WrenchConfig};
    use panelbot_types::Vec3;

    fn camera() -> CameraModel {
        CameraModel::new(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2, 200, 200)
            .unwrap()
    }

    fn valve_frame(col: i32, row: i32) -> RgbImage {
        let mut frame = RgbImage::from_pixel(200, 200, Rgb([220, 220, 220]));
        draw_filled_circle_mut(&mut frame, (col, row), 30, Rgb([20, 20, 20]));
        frame
    }

    fn runner(frames: Vec<RgbImage>, state: &SharedState, cancel: CancelToken) -> PerceptionRunner {
        let config = TaskConfig {
            wrench_max_frames: 3,
            ..TaskConfig::default()
        };
        PerceptionRunner::new(
            LocalizationPipeline::wrench(camera(), WrenchConfig::default()).unwrap(),
            LocalizationPipeline::valve(camera(), ValveConfig::default()),
            Box::new(SimFrameSource::new("sim_cam", frames)),
            state.clone(),
            cancel,
            &config,
        )
    }

    /// End effector 0.1 m short of both targets.
    fn seeded_state() -> SharedState {
        let state = SharedState::in_memory();
        state.set_ee_position(Vec3::new(1.9, 0.0, 1.0)).unwrap();
        state.set_target_position(ObjectClass::Valve, Vec3::new(2.0, 0.0, 1.0)).unwrap();
        state.set_target_position(ObjectClass::Wrench, Vec3::new(2.0, 0.0, 1.0)).unwrap();
        state
    }

    #[test]
    fn centred_valve_is_reported_centered() {
        let state = seeded_state();
        let mut step = runner(vec![valve_frame(100, 100)], &state, CancelToken::new());
        assert_eq!(step.identify_valve().unwrap(), PerceptionStatus::ValveCentered);
        assert_eq!(state.status().unwrap(), PerceptionStatus::ValveCentered);
        assert!(state.get_vec3(keys::VALVE_ID_M).is_ok());
        // Target untouched.
        assert_eq!(state.target_position(ObjectClass::Valve).unwrap(), Vec3::new(2.0, 0.0, 1.0));
    }

    #[test]
    fn off_centre_valve_moves_targets() {
        let state = seeded_state();
        let mut step = runner(vec![valve_frame(60, 100)], &state, CancelToken::new());
        assert_eq!(step.identify_valve().unwrap(), PerceptionStatus::ValveOffCenter);
        let valve = state.target_position(ObjectClass::Valve).unwrap();
        // Left of centre is positive y.
        assert!(valve.y > 0.0);
        assert_eq!(valve.x, 2.0);
        let ee = state.ee_position().unwrap();
        assert!((ee.x - 1.5).abs() < 1e-12);
        assert_eq!(ee.y, valve.y);
    }

    #[test]
    fn missing_valve_is_not_found() {
        let state = seeded_state();
        let blank = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        let mut step = runner(vec![blank], &state, CancelToken::new());
        assert_eq!(step.identify_valve().unwrap(), PerceptionStatus::ValveNotFound);
        assert_eq!(state.status().unwrap(), PerceptionStatus::ValveNotFound);
    }

    #[test]
    fn wrench_budget_exhaustion_is_not_found() {
        let state = seeded_state();
        let blank = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        let mut step = runner(vec![blank.clone(), blank], &state, CancelToken::new());
        assert_eq!(step.identify_wrench().unwrap(), PerceptionStatus::WrenchNotFound);
        assert!(state.get_pixel(keys::WRENCH_ID_PX).is_err());
    }

    #[test]
    fn cancelled_step_writes_aborted() {
        let state = seeded_state();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut step = runner(vec![valve_frame(100, 100)], &state, cancel);
        assert_eq!(step.identify_valve().unwrap(), PerceptionStatus::Aborted);
        assert_eq!(state.status().unwrap(), PerceptionStatus::Aborted);
    }

    #[test]
    fn missing_positions_are_errors() {
        let state = SharedState::in_memory();
        let mut step = runner(vec![valve_frame(100, 100)], &state, CancelToken::new());
        assert!(matches!(step.identify_valve(), Err(PanelError::MissingKey(_))));
    }
}
