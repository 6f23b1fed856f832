//! Per-invocation pipeline state machine
//!
//! Received → Fetching → Decoding → Embedding → Persisting → Done
//!
//! `Failed(stage)` is reachable from every non-terminal state. No state is
//! re-entered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Pipeline stage that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Decode,
    Embed,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Embed => "embed",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Received,
    Fetching,
    Decoding,
    Embedding,
    Persisting,
    Done,
    Failed(Stage),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Stage being worked on, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Fetching => Some(Stage::Fetch),
            PipelineState::Decoding => Some(Stage::Decode),
            PipelineState::Embedding => Some(Stage::Embed),
            PipelineState::Persisting => Some(Stage::Persist),
            _ => None,
        }
    }

    /// The only legal successor on the success path
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Received => Some(PipelineState::Fetching),
            PipelineState::Fetching => Some(PipelineState::Decoding),
            PipelineState::Decoding => Some(PipelineState::Embedding),
            PipelineState::Embedding => Some(PipelineState::Persisting),
            PipelineState::Persisting => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed(_) => None,
        }
    }

    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        match target {
            PipelineState::Failed(_) => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub old_state: PipelineState,
    pub new_state: PipelineState,
}

/// Tracks one invocation's progress through the states
#[derive(Debug)]
pub struct PipelineRun {
    state: PipelineState,
    started_at: Instant,
    stage_started_at: Instant,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: PipelineState::Received,
            started_at: now,
            stage_started_at: now,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `new_state`
    ///
    /// Illegal transitions are a programming error in the orchestrator.
    pub fn transition_to(&mut self, new_state: PipelineState) -> StateTransition {
        debug_assert!(
            self.state.can_transition_to(new_state),
            "illegal pipeline transition {:?} -> {:?}",
            self.state,
            new_state
        );

        let transition = StateTransition {
            old_state: self.state,
            new_state,
        };
        self.state = new_state;
        self.stage_started_at = Instant::now();
        transition
    }

    /// Advance along the success path
    pub fn advance(&mut self) -> StateTransition {
        let next = self.state.next().unwrap_or(self.state);
        self.transition_to(next)
    }

    /// Mark the current stage as failed
    pub fn fail(&mut self, stage: Stage) -> StateTransition {
        self.transition_to(PipelineState::Failed(stage))
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }

    pub fn stage_elapsed_ms(&self) -> u128 {
        self.stage_started_at.elapsed().as_millis()
    }
}
