//! Transition tables of the four mission sub-machines.
//!
//! ```text
//! Navigate ──readyToOrient──► Orient ──readyToGrabWrench──► GraspWrench ──readyToOperate──► OperateValve
//!    └──────────moveArm (test_arm)──────────────────────────────┘   └─testingArm─► success
//! ```
//!
//! Each table lists every `(state, outcome)` pair the state can produce.
//! `moveStuck` loops a motion state onto itself; the runner's retry counter
//! turns the second one into `moveFailed`.

use crate::fsm::{SubMachine, Transition};
use crate::outcome::Outcome;

// ─────────────────────────────────────────────────────────────────────────────
// Navigate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateState {
    FindBoard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateExit {
    ReadyToOrient,
    MoveArm,
    FailedToMove,
}

pub struct Navigate;

impl SubMachine for Navigate {
    type State = NavigateState;
    type Exit = NavigateExit;
    const NAME: &'static str = "navigate";
    const INITIAL: NavigateState = NavigateState::FindBoard;
    const FAILURE: NavigateExit = NavigateExit::FailedToMove;

    fn transition(state: NavigateState, outcome: Outcome) -> Option<Transition<NavigateState, NavigateExit>> {
        use NavigateState::*;
        use Transition::*;
        Some(match (state, outcome) {
            (FindBoard, Outcome::AtBoard) => Exit(NavigateExit::ReadyToOrient),
            (FindBoard, Outcome::SkipNav) => Exit(NavigateExit::MoveArm),
            (FindBoard, Outcome::MoveStuck) => Next(FindBoard),
            (FindBoard, Outcome::MoveFailed) => Exit(NavigateExit::FailedToMove),
            _ => return None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orient
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientState {
    OrientBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientExit {
    ReadyToGrabWrench,
    FailedToMove,
}

pub struct Orient;

impl SubMachine for Orient {
    type State = OrientState;
    type Exit = OrientExit;
    const NAME: &'static str = "orient";
    const INITIAL: OrientState = OrientState::OrientBase;
    const FAILURE: OrientExit = OrientExit::FailedToMove;

    fn transition(state: OrientState, outcome: Outcome) -> Option<Transition<OrientState, OrientExit>> {
        use OrientState::*;
        use Transition::*;
        Some(match (state, outcome) {
            (OrientBase, Outcome::Oriented) => Exit(OrientExit::ReadyToGrabWrench),
            (OrientBase, Outcome::MoveStuck) => Next(OrientBase),
            (OrientBase, Outcome::MoveFailed) => Exit(OrientExit::FailedToMove),
            _ => return None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GraspWrench
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraspState {
    MoveToReady,
    MoveToWrenchReady,
    IdentifyWrench,
    MoveToWrench,
    MoveToGrasp,
    GraspWrench,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraspExit {
    ReadyToOperate,
    TestingArm,
    FailedToMove,
    DroppedWrench,
    WrenchIdFailed,
}

pub struct GraspWrench;

impl SubMachine for GraspWrench {
    type State = GraspState;
    type Exit = GraspExit;
    const NAME: &'static str = "grasp_wrench";
    const INITIAL: GraspState = GraspState::MoveToReady;
    const FAILURE: GraspExit = GraspExit::FailedToMove;

    fn transition(state: GraspState, outcome: Outcome) -> Option<Transition<GraspState, GraspExit>> {
        use GraspState::*;
        use Transition::*;
        Some(match (state, outcome) {
            (MoveToReady, Outcome::AtReady) => Next(MoveToWrenchReady),
            (MoveToWrenchReady, Outcome::AtWrenchReady) => Next(IdentifyWrench),
            (MoveToWrenchReady, Outcome::MoveToOperate) => Exit(GraspExit::ReadyToOperate),
            (IdentifyWrench, Outcome::WrenchFound) => Next(MoveToWrench),
            (IdentifyWrench, Outcome::ArmTest) => Exit(GraspExit::TestingArm),
            (IdentifyWrench, Outcome::WrenchNotFound) => Exit(GraspExit::WrenchIdFailed),
            (MoveToWrench, Outcome::AtWrench) => Next(MoveToGrasp),
            (MoveToGrasp, Outcome::ReadyToGrasp) => Next(GraspState::GraspWrench),
            // Back to the wrench-ready pose; holding the wrench it exits.
            (GraspState::GraspWrench, Outcome::WrenchGrasped) => Next(MoveToWrenchReady),
            (GraspState::GraspWrench, Outcome::GripFailure) => Exit(GraspExit::DroppedWrench),
            (
                s @ (MoveToReady | MoveToWrenchReady | MoveToWrench | MoveToGrasp),
                Outcome::MoveStuck,
            ) => Next(s),
            (MoveToReady | MoveToWrenchReady | MoveToWrench | MoveToGrasp, Outcome::MoveFailed) => {
                Exit(GraspExit::FailedToMove)
            }
            _ => return None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OperateValve
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperateState {
    StowArm,
    DriveToValve,
    MoveToValveReady,
    IdentifyValve,
    MoveToValve,
    ServoToValve,
    MoveToOperate,
    RotateValve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperateExit {
    ValveOperated,
    FailedToMove,
    FailedToStowArm,
    ValveIdFailed,
    LostWrench,
    ValveStuck,
}

pub struct OperateValve;

impl SubMachine for OperateValve {
    type State = OperateState;
    type Exit = OperateExit;
    const NAME: &'static str = "operate_valve";
    const INITIAL: OperateState = OperateState::StowArm;
    const FAILURE: OperateExit = OperateExit::FailedToMove;

    fn transition(state: OperateState, outcome: Outcome) -> Option<Transition<OperateState, OperateExit>> {
        use OperateState::*;
        use Transition::*;
        Some(match (state, outcome) {
            (StowArm, Outcome::ArmStowed) => Next(DriveToValve),
            (StowArm, Outcome::StowArmFailed) => Exit(OperateExit::FailedToStowArm),
            (DriveToValve, Outcome::AtValveDrive) => Next(MoveToValveReady),
            (MoveToValveReady, Outcome::AtValveReady) => Next(IdentifyValve),
            (IdentifyValve, Outcome::ValveLocated) => Next(MoveToValve),
            (IdentifyValve, Outcome::ValveNotFound) => Exit(OperateExit::ValveIdFailed),
            (MoveToValve, Outcome::ServoArm) => Next(ServoToValve),
            (MoveToValve, Outcome::MoveForward) => Next(MoveToOperate),
            (ServoToValve, Outcome::MoveSuccess) => Next(IdentifyValve),
            (MoveToOperate, Outcome::WrenchOnValve) => Next(RotateValve),
            (MoveToOperate | RotateValve, Outcome::WrenchFell) => Exit(OperateExit::LostWrench),
            (RotateValve, Outcome::TurnedValve) => Exit(OperateExit::ValveOperated),
            (RotateValve, Outcome::CantTurnValve) => Exit(OperateExit::ValveStuck),
            (
                s @ (DriveToValve | MoveToValveReady | ServoToValve | MoveToOperate),
                Outcome::MoveStuck,
            ) => Next(s),
            (DriveToValve | MoveToValveReady | ServoToValve | MoveToOperate, Outcome::MoveFailed) => {
                Exit(OperateExit::FailedToMove)
            }
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_skips_to_arm_when_testing() {
        assert_eq!(
            Navigate::transition(NavigateState::FindBoard, Outcome::SkipNav),
            Some(Transition::Exit(NavigateExit::MoveArm))
        );
        assert_eq!(
            Navigate::transition(NavigateState::FindBoard, Outcome::MoveStuck),
            Some(Transition::Next(NavigateState::FindBoard))
        );
    }

    #[test]
    fn orient_rejects_foreign_outcomes() {
        assert_eq!(Orient::transition(OrientState::OrientBase, Outcome::AtBoard), None);
    }

    #[test]
    fn grasp_back_edge_returns_to_wrench_ready() {
        assert_eq!(
            GraspWrench::transition(GraspState::GraspWrench, Outcome::WrenchGrasped),
            Some(Transition::Next(GraspState::MoveToWrenchReady))
        );
        assert_eq!(
            GraspWrench::transition(GraspState::MoveToWrenchReady, Outcome::MoveToOperate),
            Some(Transition::Exit(GraspExit::ReadyToOperate))
        );
    }

    #[test]
    fn grasp_motion_states_retry_in_place() {
        for s in [
            GraspState::MoveToReady,
            GraspState::MoveToWrenchReady,
            GraspState::MoveToWrench,
            GraspState::MoveToGrasp,
        ] {
            assert_eq!(GraspWrench::transition(s, Outcome::MoveStuck), Some(Transition::Next(s)));
            assert_eq!(
                GraspWrench::transition(s, Outcome::MoveFailed),
                Some(Transition::Exit(GraspExit::FailedToMove))
            );
        }
        assert_eq!(GraspWrench::transition(GraspState::GraspWrench, Outcome::MoveStuck), None);
    }

    #[test]
    fn identify_wrench_exits() {
        assert_eq!(
            GraspWrench::transition(GraspState::IdentifyWrench, Outcome::ArmTest),
            Some(Transition::Exit(GraspExit::TestingArm))
        );
        assert_eq!(
            GraspWrench::transition(GraspState::IdentifyWrench, Outcome::WrenchNotFound),
            Some(Transition::Exit(GraspExit::WrenchIdFailed))
        );
    }

    #[test]
    fn valve_servo_loop() {
        assert_eq!(
            OperateValve::transition(OperateState::MoveToValve, Outcome::ServoArm),
            Some(Transition::Next(OperateState::ServoToValve))
        );
        assert_eq!(
            OperateValve::transition(OperateState::ServoToValve, Outcome::MoveSuccess),
            Some(Transition::Next(OperateState::IdentifyValve))
        );
        assert_eq!(
            OperateValve::transition(OperateState::MoveToValve, Outcome::MoveForward),
            Some(Transition::Next(OperateState::MoveToOperate))
        );
    }

    #[test]
    fn irrecoverable_valve_exits() {
        assert_eq!(
            OperateValve::transition(OperateState::StowArm, Outcome::StowArmFailed),
            Some(Transition::Exit(OperateExit::FailedToStowArm))
        );
        assert_eq!(
            OperateValve::transition(OperateState::RotateValve, Outcome::WrenchFell),
            Some(Transition::Exit(OperateExit::LostWrench))
        );
        assert_eq!(
            OperateValve::transition(OperateState::RotateValve, Outcome::CantTurnValve),
            Some(Transition::Exit(OperateExit::ValveStuck))
        );
        assert_eq!(OperateValve::transition(OperateState::StowArm, Outcome::MoveStuck), None);
    }
}
