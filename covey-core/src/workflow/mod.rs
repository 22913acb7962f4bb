//! Run orchestration: state machine, event log, and the engine
//!
//! A run drives one end-to-end execution of an agent workflow: the
//! orchestrator activates the root agent, dispatches turns, validates
//! handoffs, and stops at a terminal output or when the turn budget is
//! exhausted.

mod engine;
mod events;
mod state;

pub use engine::{FailureReason, Orchestrator, OrchestratorConfig, RunOutcome, RunReport};
pub use events::RunEvent;
pub use state::{PhaseTransition, RunPhase, RunState};
