//! Top-level task orchestrator.
//!
//! [`TaskOrchestrator::run`] walks Navigate → Orient → GraspWrench →
//! OperateValve.  Each phase is a [`SubMachine`](crate::fsm::SubMachine)
//! driven by [`run_machine`]; the phase's exit decides the next phase or the
//! final [`TaskOutcome`].  Any non-success exit ends the run with
//! [`TaskOutcome::Failure`].  There is no rollback.
//!
//! State executors translate between the outside world and outcomes:
//!
//! - motion states issue one [`MotionCommand`] and map the report
//!   (`Arrived` → the state's success outcome, `Stuck` → `moveStuck`,
//!   anything else → `moveFailed`);
//! - identification states call the [`PerceptionRunner`] and read back the
//!   status it wrote;
//! - a shared-state error inside a state is logged and becomes that state's
//!   failure outcome.

use panelbot_hal::{MotionCommand, MotionInterface, MotionReport, NamedPose};
use panelbot_memory::{SharedState, keys};
use panelbot_types::{ObjectClass, PanelError, PerceptionStatus, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::TaskConfig;
use crate::fsm::run_machine;
use crate::machines::{
    GraspExit, GraspState, GraspWrench, Navigate, NavigateExit, NavigateState, OperateExit,
    OperateState, OperateValve, Orient, OrientExit, OrientState,
};
use crate::outcome::{Outcome, TaskOutcome};
use crate::perception_step::PerceptionRunner;

/// Flags handed from state to state by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUserdata {
    /// Skip navigation and stop after moving the arm to the wrench.
    #[serde(default)]
    pub test_arm: bool,
    #[serde(default = "default_max_move_retries")]
    pub max_move_retries: u32,
    #[serde(default)]
    pub have_wrench: bool,
    #[serde(default)]
    pub valve_centered: bool,
    #[serde(default)]
    pub valve_turned: bool,
}

fn default_max_move_retries() -> u32 {
    1
}

impl Default for TaskUserdata {
    fn default() -> Self {
        Self {
            test_arm: false,
            max_move_retries: default_max_move_retries(),
            have_wrench: false,
            valve_centered: false,
            valve_turned: false,
        }
    }
}

impl TaskUserdata {
    pub fn from_config(config: &TaskConfig, test_arm: bool) -> Self {
        Self {
            test_arm,
            max_move_retries: config.max_move_retries,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Navigate,
    Orient,
    GraspWrench,
    OperateValve,
}

/// Drives one robot through the panel task.
pub struct TaskOrchestrator<M> {
    motion: M,
    perception: PerceptionRunner,
    state: SharedState,
    cancel: CancelToken,
    config: TaskConfig,
    userdata: TaskUserdata,
    servo_iterations: u32,
}

impl<M: MotionInterface> TaskOrchestrator<M> {
    pub fn new(
        motion: M,
        perception: PerceptionRunner,
        state: SharedState,
        cancel: CancelToken,
        config: TaskConfig,
    ) -> Self {
        Self {
            motion,
            perception,
            state,
            cancel,
            config,
            userdata: TaskUserdata::default(),
            servo_iterations: 0,
        }
    }

    /// Userdata as left by the most recent run.
    pub fn userdata(&self) -> &TaskUserdata {
        &self.userdata
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    /// Run the whole task starting from `userdata`.
    ///
    /// With `test_arm` set, navigation is skipped but the grasp machine still
    /// drives `MoveToReady` and `MoveToWrenchReady` before `IdentifyWrench`
    /// exits on `ArmTest`, so the arm ends at the wrench-ready pose.
    pub fn run(&mut self, userdata: TaskUserdata) -> TaskOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("task_run", %run_id, test_arm = userdata.test_arm);
        let _guard = span.enter();

        self.userdata = userdata;
        let mut phase = Phase::Navigate;
        info!("task started");

        let outcome = loop {
            let next = match phase {
                Phase::Navigate => match self.navigate() {
                    NavigateExit::ReadyToOrient => Ok(Phase::Orient),
                    NavigateExit::MoveArm => Ok(Phase::GraspWrench),
                    other => Err(format!("{other:?}")),
                },
                Phase::Orient => match self.orient() {
                    OrientExit::ReadyToGrabWrench => Ok(Phase::GraspWrench),
                    other => Err(format!("{other:?}")),
                },
                Phase::GraspWrench => match self.grasp_wrench() {
                    GraspExit::ReadyToOperate => Ok(Phase::OperateValve),
                    GraspExit::TestingArm => break TaskOutcome::Success,
                    other => Err(format!("{other:?}")),
                },
                Phase::OperateValve => match self.operate_valve() {
                    OperateExit::ValveOperated => break TaskOutcome::Success,
                    other => Err(format!("{other:?}")),
                },
            };
            match next {
                Ok(p) => phase = p,
                Err(exit) => {
                    warn!(?phase, %exit, "phase failed");
                    break TaskOutcome::Failure;
                }
            }
        };

        info!(%outcome, "task finished");
        outcome
    }

    // ── Phases ───────────────────────────────────────────────────────────────

    fn navigate(&mut self) -> NavigateExit {
        let cancel = self.cancel.clone();
        let retries = self.userdata.max_move_retries;
        run_machine::<Navigate, _>(self, &cancel, retries, |this, state| match state {
            NavigateState::FindBoard => this.find_board(),
        })
    }

    fn orient(&mut self) -> OrientExit {
        let cancel = self.cancel.clone();
        let retries = self.userdata.max_move_retries;
        run_machine::<Orient, _>(self, &cancel, retries, |this, state| match state {
            OrientState::OrientBase => this.command(&MotionCommand::AlignBase, Outcome::Oriented),
        })
    }

    fn grasp_wrench(&mut self) -> GraspExit {
        let cancel = self.cancel.clone();
        let retries = self.userdata.max_move_retries;
        run_machine::<GraspWrench, _>(self, &cancel, retries, |this, state| {
            this.grasp_state(state).unwrap_or_else(|e| {
                error!(?state, error = %e, "state failed");
                match state {
                    GraspState::IdentifyWrench => Outcome::WrenchNotFound,
                    GraspState::GraspWrench => Outcome::GripFailure,
                    _ => Outcome::MoveFailed,
                }
            })
        })
    }

    fn operate_valve(&mut self) -> OperateExit {
        self.servo_iterations = 0;
        let cancel = self.cancel.clone();
        let retries = self.userdata.max_move_retries;
        run_machine::<OperateValve, _>(self, &cancel, retries, |this, state| {
            this.operate_state(state).unwrap_or_else(|e| {
                error!(?state, error = %e, "state failed");
                match state {
                    OperateState::StowArm => Outcome::StowArmFailed,
                    OperateState::IdentifyValve => Outcome::ValveNotFound,
                    OperateState::RotateValve => Outcome::CantTurnValve,
                    _ => Outcome::MoveFailed,
                }
            })
        })
    }

    // ── States ───────────────────────────────────────────────────────────────

    fn find_board(&mut self) -> Outcome {
        if self.userdata.test_arm {
            info!("arm test requested, skipping navigation");
            return Outcome::SkipNav;
        }
        match self.state.target_position(ObjectClass::Wrench) {
            Ok(board) => self.command(&MotionCommand::DriveBase(board), Outcome::AtBoard),
            Err(e) => {
                error!(error = %e, "no board position to drive to");
                Outcome::MoveFailed
            }
        }
    }

    fn grasp_state(&mut self, state: GraspState) -> Result<Outcome, PanelError> {
        let cfg = &self.config;
        Ok(match state {
            GraspState::MoveToReady => {
                self.command(&MotionCommand::MoveToPose(NamedPose::Ready), Outcome::AtReady)
            }
            GraspState::MoveToWrenchReady => {
                let wrench = self.state.target_position(ObjectClass::Wrench)?;
                let target = wrench.sub(Vec3::new(cfg.wrench_standoff, 0.0, 0.0));
                let arrived = if self.userdata.have_wrench {
                    Outcome::MoveToOperate
                } else {
                    Outcome::AtWrenchReady
                };
                self.move_end_effector(target, arrived)?
            }
            GraspState::IdentifyWrench => {
                if self.userdata.test_arm {
                    return Ok(Outcome::ArmTest);
                }
                match self.perception.identify_wrench()? {
                    PerceptionStatus::WrenchFound => Outcome::WrenchFound,
                    _ => Outcome::WrenchNotFound,
                }
            }
            GraspState::MoveToWrench => {
                let ee = self.state.ee_position()?;
                let id = self.state.get_vec3(keys::WRENCH_ID_M)?;
                let target = ee.add(Vec3::new(id.x - cfg.grasp_clearance, id.y, id.z));
                self.move_end_effector(target, Outcome::AtWrench)?
            }
            GraspState::MoveToGrasp => {
                let ee = self.state.ee_position()?;
                let target = ee.add(Vec3::new(cfg.grasp_clearance, 0.0, 0.0));
                self.move_end_effector(target, Outcome::ReadyToGrasp)?
            }
            GraspState::GraspWrench => {
                match self.execute(&MotionCommand::Gripper { closed: true }) {
                    Some(MotionReport::Arrived) => {
                        self.userdata.have_wrench = true;
                        info!("wrench grasped");
                        Outcome::WrenchGrasped
                    }
                    _ => Outcome::GripFailure,
                }
            }
        })
    }

    fn operate_state(&mut self, state: OperateState) -> Result<Outcome, PanelError> {
        let cfg = &self.config;
        Ok(match state {
            OperateState::StowArm => match self.execute(&MotionCommand::MoveToPose(NamedPose::Stow)) {
                Some(MotionReport::Arrived) => Outcome::ArmStowed,
                _ => Outcome::StowArmFailed,
            },
            OperateState::DriveToValve => {
                let valve = self.state.target_position(ObjectClass::Valve)?;
                self.command(&MotionCommand::DriveBase(valve), Outcome::AtValveDrive)
            }
            OperateState::MoveToValveReady => {
                let valve = self.state.target_position(ObjectClass::Valve)?;
                let target = valve.sub(Vec3::new(cfg.valve_standoff, 0.0, 0.0));
                self.move_end_effector(target, Outcome::AtValveReady)?
            }
            OperateState::IdentifyValve => {
                if self.servo_iterations >= cfg.max_servo_iterations {
                    warn!(iterations = self.servo_iterations, "valve servo budget exhausted");
                    return Ok(Outcome::ValveNotFound);
                }
                match self.perception.identify_valve()? {
                    PerceptionStatus::ValveCentered => {
                        self.userdata.valve_centered = true;
                        Outcome::ValveLocated
                    }
                    PerceptionStatus::ValveOffCenter => {
                        self.userdata.valve_centered = false;
                        Outcome::ValveLocated
                    }
                    _ => Outcome::ValveNotFound,
                }
            }
            OperateState::MoveToValve => {
                if self.userdata.valve_centered {
                    Outcome::MoveForward
                } else {
                    Outcome::ServoArm
                }
            }
            OperateState::ServoToValve => {
                self.servo_iterations += 1;
                // Centering already rewrote `ee_position`.
                let target = self.state.ee_position()?;
                self.command(&MotionCommand::MoveEndEffector(target), Outcome::MoveSuccess)
            }
            OperateState::MoveToOperate => {
                let valve = self.state.target_position(ObjectClass::Valve)?;
                let target = valve.sub(Vec3::new(cfg.operate_clearance, 0.0, 0.0));
                match self.execute(&MotionCommand::MoveEndEffector(target)) {
                    Some(MotionReport::Arrived) => {
                        self.state.set_ee_position(target)?;
                        Outcome::WrenchOnValve
                    }
                    Some(MotionReport::Stuck) => Outcome::MoveStuck,
                    Some(MotionReport::PayloadLost) => lost_wrench(&mut self.userdata),
                    _ => Outcome::MoveFailed,
                }
            }
            OperateState::RotateValve => {
                let radians = cfg.valve_turn_angle;
                match self.execute(&MotionCommand::RotateWrist { radians }) {
                    Some(MotionReport::Arrived) => {
                        self.userdata.valve_turned = true;
                        info!(radians, "valve turned");
                        Outcome::TurnedValve
                    }
                    Some(MotionReport::PayloadLost) => lost_wrench(&mut self.userdata),
                    _ => Outcome::CantTurnValve,
                }
            }
        })
    }

    // ── Motion helpers ───────────────────────────────────────────────────────

    /// Send `command`; `None` when the motion system could not be reached.
    fn execute(&mut self, command: &MotionCommand) -> Option<MotionReport> {
        match self.motion.execute(command) {
            Ok(report) => Some(report),
            Err(e) => {
                error!(arm = self.motion.id(), ?command, error = %e, "motion command failed");
                None
            }
        }
    }

    fn command(&mut self, command: &MotionCommand, arrived: Outcome) -> Outcome {
        match self.execute(command) {
            Some(MotionReport::Arrived) => arrived,
            Some(MotionReport::Stuck) => Outcome::MoveStuck,
            Some(report) => {
                warn!(?command, ?report, "motion did not complete");
                Outcome::MoveFailed
            }
            None => Outcome::MoveFailed,
        }
    }

    /// Move the end effector and record the new position on arrival.
    fn move_end_effector(&mut self, target: Vec3, arrived: Outcome) -> Result<Outcome, PanelError> {
        let outcome = self.command(&MotionCommand::MoveEndEffector(target), arrived);
        if outcome == arrived {
            self.state.set_ee_position(target)?;
        }
        Ok(outcome)
    }
}

fn lost_wrench(userdata: &mut TaskUserdata) -> Outcome {
    warn!("wrench slipped out of the gripper");
    userdata.have_wrench = false;
    Outcome::WrenchFell
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;
    use panelbot_hal::{CameraModel, SimArm, SimFrameSource};
    use panelbot_perception::{LocalizationPipeline, ValveConfig, WrenchConfig};

    fn camera() -> CameraModel {
        CameraModel::new(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2, 200, 200)
            .unwrap()
    }

    fn valve_frame(col: i32) -> RgbImage {
        let mut frame = RgbImage::from_pixel(200, 200, Rgb([220, 220, 220]));
        draw_filled_circle_mut(&mut frame, (col, 100), 30, Rgb([20, 20, 20]));
        frame
    }

    fn test_config() -> TaskConfig {
        TaskConfig {
            wrench_max_frames: 2,
            max_servo_iterations: 3,
            // Short standoff keeps the centering tolerance at several pixels.
            valve_standoff: 0.2,
            ..TaskConfig::default()
        }
    }

    fn orchestrator(arm: SimArm, frames: SimFrameSource) -> (TaskOrchestrator<SimArm>, SharedState) {
        let state = SharedState::in_memory();
        state.set_target_position(ObjectClass::Wrench, Vec3::new(1.0, 0.2, 0.8)).unwrap();
        state.set_target_position(ObjectClass::Valve, Vec3::new(2.0, 0.0, 1.0)).unwrap();
        state.set_ee_position(Vec3::new(0.3, 0.0, 1.0)).unwrap();
        let cancel = CancelToken::new();
        let config = test_config();
        let perception = PerceptionRunner::new(
            LocalizationPipeline::wrench(camera(), WrenchConfig::default()).unwrap(),
            LocalizationPipeline::valve(camera(), ValveConfig::default()),
            Box::new(frames),
            state.clone(),
            cancel.clone(),
            &config,
        );
        (TaskOrchestrator::new(arm, perception, state.clone(), cancel, config), state)
    }

    fn no_frames() -> SimFrameSource {
        SimFrameSource::new("sim_cam", Vec::new())
    }

    #[test]
    fn arm_test_skips_navigation_and_succeeds() {
        let (mut orch, state) = orchestrator(SimArm::new("sim_arm"), no_frames());
        let userdata = TaskUserdata {
            test_arm: true,
            ..TaskUserdata::default()
        };
        assert_eq!(orch.run(userdata), TaskOutcome::Success);
        // MoveToReady, then MoveToWrenchReady; ArmTest exits without moving.
        assert_eq!(
            orch.motion().history(),
            &[
                MotionCommand::MoveToPose(NamedPose::Ready),
                MotionCommand::MoveEndEffector(Vec3::new(0.6, 0.2, 0.8)),
            ]
        );
        assert_eq!(state.ee_position().unwrap(), Vec3::new(0.6, 0.2, 0.8));
    }

    #[test]
    fn single_stuck_is_retried() {
        let arm = SimArm::new("sim_arm").with_script([MotionReport::Stuck]);
        let (mut orch, _) = orchestrator(arm, no_frames());
        let userdata = TaskUserdata {
            test_arm: true,
            ..TaskUserdata::default()
        };
        assert_eq!(orch.run(userdata), TaskOutcome::Success);
        assert_eq!(orch.motion().history().len(), 3);
    }

    #[test]
    fn second_stuck_fails_the_task() {
        let arm = SimArm::new("sim_arm").with_script([MotionReport::Stuck, MotionReport::Stuck]);
        let (mut orch, _) = orchestrator(arm, no_frames());
        assert_eq!(orch.run(TaskUserdata::default()), TaskOutcome::Failure);
        // DriveBase tried twice, nothing after.
        assert_eq!(orch.motion().history().len(), 2);
    }

    #[test]
    fn hardware_fault_fails_the_task() {
        let arm = SimArm::new("sim_arm").with_fault("controller offline");
        let (mut orch, _) = orchestrator(arm, no_frames());
        assert_eq!(orch.run(TaskUserdata::default()), TaskOutcome::Failure);
        assert_eq!(orch.motion().history().len(), 1);
    }

    #[test]
    fn missing_wrench_fails_identification() {
        let blank = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        let frames = SimFrameSource::new("sim_cam", vec![blank]).cycling();
        let (mut orch, state) = orchestrator(SimArm::new("sim_arm"), frames);
        assert_eq!(orch.run(TaskUserdata::default()), TaskOutcome::Failure);
        assert_eq!(state.status().unwrap(), PerceptionStatus::WrenchNotFound);
        // DriveBase, AlignBase, ready pose, wrench-ready pose.
        assert_eq!(orch.motion().history().len(), 4);
    }

    #[test]
    fn held_wrench_goes_straight_to_the_valve() {
        let frames = SimFrameSource::new("sim_cam", vec![valve_frame(100)]);
        let (mut orch, state) = orchestrator(SimArm::new("sim_arm"), frames);
        let userdata = TaskUserdata {
            have_wrench: true,
            ..TaskUserdata::default()
        };
        assert_eq!(orch.run(userdata), TaskOutcome::Success);
        let done = orch.userdata();
        assert!(done.valve_centered);
        assert!(done.valve_turned);
        assert_eq!(state.status().unwrap(), PerceptionStatus::ValveCentered);
        assert_eq!(
            orch.motion().history().last(),
            Some(&MotionCommand::RotateWrist {
                radians: std::f64::consts::FRAC_PI_2
            })
        );
    }

    #[test]
    fn servo_loop_is_bounded() {
        let frames = SimFrameSource::new("sim_cam", vec![valve_frame(40)]).cycling();
        let (mut orch, _) = orchestrator(SimArm::new("sim_arm"), frames);
        let userdata = TaskUserdata {
            have_wrench: true,
            ..TaskUserdata::default()
        };
        assert_eq!(orch.run(userdata), TaskOutcome::Failure);
        let servo_moves = orch
            .motion()
            .history()
            .iter()
            .skip_while(|c| **c != MotionCommand::MoveToPose(NamedPose::Stow))
            .filter(|c| matches!(c, MotionCommand::MoveEndEffector(_)))
            .count();
        // Valve-ready pose plus three servo moves.
        assert_eq!(servo_moves, 4);
    }

    #[test]
    fn grip_failure_fails_the_task() {
        // Ready, wrench-ready, approach, grasp pose, then the gripper.
        let mut script = vec![MotionReport::Arrived; 4];
        script.push(MotionReport::Failed);
        let arm = SimArm::new("sim_arm").with_script(script);
        let (mut orch, state) = orchestrator(arm, no_frames());
        state.set_vec3(keys::WRENCH_ID_M, Vec3::new(0.4, 0.0, 0.0)).unwrap();
        // Skip perception by driving the grasp machine directly.
        orch.userdata = TaskUserdata::default();
        let cancel = CancelToken::new();
        let exit = run_machine::<GraspWrench, _>(&mut orch, &cancel, 1, |this, s| match s {
            GraspState::IdentifyWrench => Outcome::WrenchFound,
            s => this.grasp_state(s).unwrap(),
        });
        assert_eq!(exit, GraspExit::DroppedWrench);
        assert!(!orch.userdata().have_wrench);
    }

    #[test]
    fn lost_wrench_while_turning() {
        let frames = SimFrameSource::new("sim_cam", vec![valve_frame(100)]);
        // Stow, drive, valve-ready, operate pose, rotate.
        let script = [
            MotionReport::Arrived,
            MotionReport::Arrived,
            MotionReport::Arrived,
            MotionReport::Arrived,
            MotionReport::PayloadLost,
        ];
        let arm = SimArm::new("sim_arm").with_script(script);
        let (mut orch, _) = orchestrator(arm, frames);
        orch.userdata = TaskUserdata {
            have_wrench: true,
            ..TaskUserdata::default()
        };
        assert_eq!(orch.operate_valve(), OperateExit::LostWrench);
        assert!(!orch.userdata().have_wrench);
    }

    #[test]
    fn cancelled_run_fails_before_any_motion() {
        let (mut orch, _) = orchestrator(SimArm::new("sim_arm"), no_frames());
        orch.cancel.cancel();
        assert_eq!(orch.run(TaskUserdata::default()), TaskOutcome::Failure);
        assert!(orch.motion().history().is_empty());
    }
}
