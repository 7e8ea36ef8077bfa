//! `panelbot-memory` – the blackboard between perception and orchestration.
//!
//! # Modules
//!
//! - [`shared_state`] – [`SharedState`][shared_state::SharedState]: typed
//!   key/value store holding the end-effector position, object targets and
//!   the last perception status, with pluggable
//!   [`StateBackend`][shared_state::StateBackend]s (in-memory or a JSON file
//!   visible to other processes).

pub mod shared_state;

pub use shared_state::{
    JsonFileBackend, MemoryBackend, SharedState, StateBackend, StateEntry, StateValue, keys,
};
