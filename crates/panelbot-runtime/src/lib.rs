//! `panelbot-runtime` – Task orchestration
//!
//! Drives the robot through the panel task: navigate to the board, square up
//! to it, pick the right wrench and turn the valve with it.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`TaskOrchestrator`][orchestrator::TaskOrchestrator]:
//!   the top-level machine chaining Navigate → Orient → GraspWrench →
//!   OperateValve and mapping every non-success exit to
//!   [`TaskOutcome::Failure`][outcome::TaskOutcome::Failure].
//! - [`machines`] – transition tables of the four sub-machines.
//! - [`fsm`] – [`run_machine`][fsm::run_machine]: the generic runner every
//!   sub-machine is executed with (retries, cancellation, unexpected
//!   outcomes).
//! - [`retry`] – [`RetryCounter`][retry::RetryCounter]: bounded retry of
//!   retryable outcomes; `moveStuck` becomes `moveFailed` once exhausted.
//! - [`perception_step`] – [`PerceptionRunner`][perception_step::PerceptionRunner]:
//!   frame-level retry around the localization pipelines, writing results
//!   into the shared state.
//! - [`outcome`] – the outcome vocabulary.
//! - [`config`] – [`TaskConfig`][config::TaskConfig].
//! - [`cancel`] – [`CancelToken`][cancel::CancelToken], flipped by the CLI's
//!   Ctrl-C handler.

pub mod cancel;
pub mod config;
pub mod fsm;
pub mod machines;
pub mod orchestrator;
pub mod outcome;
pub mod perception_step;
pub mod retry;

pub use cancel::CancelToken;
pub use config::TaskConfig;
pub use orchestrator::{TaskOrchestrator, TaskUserdata};
pub use outcome::{Outcome, TaskOutcome};
pub use perception_step::PerceptionRunner;
pub use retry::{RetryCounter, Retryable};
