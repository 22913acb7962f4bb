//! The decision-function abstraction
//!
//! The non-deterministic part of a turn lives behind [`Decider`], so the
//! deterministic core (state machine, handoff validation, termination) is
//! testable with a scripted stand-in.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::tool::ToolSpec;

use super::{AgentDef, Message, TurnResult};

/// Produces one [`TurnResult`] per agent turn
///
/// Implementations may call an external language model, replay a script,
/// or anything in between. Transport failures and undecodable output are
/// returned as errors; the orchestrator tolerates them without crashing
/// the run.
#[async_trait]
pub trait Decider: Send + Sync {
    /// Decide the active agent's next step
    async fn decide(
        &self,
        agent: &AgentDef,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<TurnResult>;
}

/// A decider that replays a fixed sequence of turn results
///
/// Used by the orchestration tests and by the CLI dry-run mode. Once the
/// script is exhausted, further turns yield an error.
pub struct ScriptedDecider {
    script: Mutex<VecDeque<TurnResult>>,
}

impl ScriptedDecider {
    /// Create a scripted decider from a sequence of turn results
    pub fn new(script: impl IntoIterator<Item = TurnResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Number of scripted steps remaining
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Decider for ScriptedDecider {
    async fn decide(
        &self,
        agent: &AgentDef,
        _history: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<TurnResult> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| Error::Decider("script lock poisoned".to_string()))?;

        script.pop_front().ok_or_else(|| {
            Error::Decider(format!(
                "script exhausted while agent {} was active",
                agent.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentDef {
        AgentDef::new("A", "test agent")
    }

    #[tokio::test]
    async fn test_scripted_decider_replays_in_order() {
        let decider = ScriptedDecider::new([
            TurnResult::Handoff {
                target: "B".to_string(),
                reason: "needs context".to_string(),
            },
            TurnResult::FinalOutput("done".to_string()),
        ]);

        assert_eq!(decider.remaining(), 2);

        let first = decider.decide(&agent(), &[], &[]).await.unwrap();
        assert!(matches!(first, TurnResult::Handoff { ref target, .. } if target == "B"));

        let second = decider.decide(&agent(), &[], &[]).await.unwrap();
        assert_eq!(second, TurnResult::FinalOutput("done".to_string()));
        assert_eq!(decider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_decider_errors_when_exhausted() {
        let decider = ScriptedDecider::new([]);
        let result = decider.decide(&agent(), &[], &[]).await;
        assert!(result.is_err());
    }
}
