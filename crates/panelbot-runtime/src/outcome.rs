//! Outcome vocabulary of the orchestrator states.
//!
//! Every state execution yields exactly one [`Outcome`].  Sub-machine
//! transition tables map `(state, outcome)` pairs to the next state or to
//! one of the machine's exits.

use serde::{Deserialize, Serialize};

use crate::retry::Retryable;

/// Tag returned by one state execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    // Shared motion outcomes.
    MoveStuck,
    MoveFailed,

    // Navigate / Orient
    AtBoard,
    SkipNav,
    Oriented,

    // GraspWrench
    AtReady,
    AtWrenchReady,
    MoveToOperate,
    WrenchFound,
    WrenchNotFound,
    ArmTest,
    AtWrench,
    ReadyToGrasp,
    WrenchGrasped,
    GripFailure,

    // OperateValve
    ArmStowed,
    StowArmFailed,
    AtValveDrive,
    AtValveReady,
    ValveLocated,
    ValveNotFound,
    ServoArm,
    MoveForward,
    MoveSuccess,
    WrenchOnValve,
    WrenchFell,
    TurnedValve,
    CantTurnValve,
}

impl Retryable for Outcome {
    fn is_retryable(self) -> bool {
        self == Outcome::MoveStuck
    }

    fn exhausted(self) -> Self {
        Outcome::MoveFailed
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The camelCase serde tag doubles as the display name.
        let tag = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&tag)
    }
}

/// Final result of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "success"),
            TaskOutcome::Failure => write!(f, "failure"),
        }
    }
}
