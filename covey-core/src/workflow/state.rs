//! Per-run state machine and bookkeeping
//!
//! The phase machine is small: a run is `Running`, briefly
//! `ValidatingHandoff` while a control transfer is checked, and finally
//! `Terminated`. The current-agent pointer is the only mutable position in
//! the control graph.

use serde::{Deserialize, Serialize};

use crate::state::SharedState;

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunPhase {
    /// An agent is active and taking turns
    #[default]
    Running,
    /// A requested handoff is being checked against the caller's
    /// declared target set
    ValidatingHandoff,
    /// The run has ended; no further turns are dispatched
    Terminated,
}

impl RunPhase {
    /// Whether a transition to `to` is legal from this phase
    pub fn can_transition_to(&self, to: &RunPhase) -> bool {
        matches!(
            (self, to),
            (RunPhase::Running, RunPhase::ValidatingHandoff)
                | (RunPhase::ValidatingHandoff, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Terminated)
                | (RunPhase::ValidatingHandoff, RunPhase::Terminated)
        )
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Terminated)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            RunPhase::Running => "Agent active",
            RunPhase::ValidatingHandoff => "Validating handoff target",
            RunPhase::Terminated => "Run terminated",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A recorded phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
}

/// Mutable bookkeeping for one run
#[derive(Debug)]
pub struct RunState {
    current_agent: String,
    turn: u32,
    phase: RunPhase,
    state: SharedState,
    terminal_write_done: bool,
    transitions: Vec<PhaseTransition>,
}

impl RunState {
    /// Create run state positioned at the root agent
    pub fn new(root_agent: impl Into<String>, state: SharedState) -> Self {
        Self {
            current_agent: root_agent.into(),
            turn: 0,
            phase: RunPhase::Running,
            state,
            terminal_write_done: false,
            transitions: Vec::new(),
        }
    }

    /// Name of the currently active agent
    pub fn current_agent(&self) -> &str {
        &self.current_agent
    }

    /// Move the current-agent pointer
    ///
    /// The engine only calls this after validating the target against the
    /// declared agent set.
    pub fn set_current_agent(&mut self, agent: impl Into<String>) {
        self.current_agent = agent.into();
    }

    /// Turns taken so far (monotonically non-decreasing)
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Start the next turn, returning its number
    pub fn begin_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Attempt a phase transition
    ///
    /// Illegal transitions are refused and logged; the phase is unchanged.
    /// Returns whether the transition happened.
    pub fn transition_to(&mut self, to: RunPhase) -> bool {
        if !self.phase.can_transition_to(&to) {
            tracing::warn!(from = ?self.phase, to = ?to, "Refusing illegal phase transition");
            return false;
        }

        tracing::debug!(from = ?self.phase, to = ?to, "Run phase transition");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
        });
        self.phase = to;
        true
    }

    /// Shared state of the run
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Mutable access to the shared state
    pub fn state_mut(&mut self) -> &mut SharedState {
        &mut self.state
    }

    /// Whether the run's terminal write has already succeeded
    pub fn terminal_write_done(&self) -> bool {
        self.terminal_write_done
    }

    /// Record that the terminal write succeeded
    pub fn mark_terminal_write_done(&mut self) {
        self.terminal_write_done = true;
    }

    /// Recorded phase transitions, in order
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Consume the run state, returning the shared state
    pub fn into_state(self) -> SharedState {
        self.state
    }
}
