//! Iteration State Machine — explicit states and legal transition guards for
//! a single task's generate/validate/reflect/repair loop.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of states a single task iteration passes through.
///
/// Every run starts at `Enter` and terminates at `Success`, `Failed`, or
/// `RetryExhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationState {
    /// Iteration counter at zero, nothing generated yet.
    Enter,
    /// Calling the model to produce source for the current iteration.
    Generate,
    /// Running the static validator against the generated source.
    Validate,
    /// Model-driven review, only entered when validation passed the
    /// acceptance threshold and a model is available.
    Reflect,
    /// Branching a `fix-iterN` node and composing repair context for the
    /// next generate call.
    RepairWithContext,
    /// Task accepted — terminal state.
    Success,
    /// Task failed for a reason other than budget exhaustion — terminal.
    Failed,
    /// Iteration budget exhausted without acceptance — terminal.
    RetryExhausted,
}

impl IterationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RetryExhausted)
    }
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "Enter"),
            Self::Generate => write!(f, "Generate"),
            Self::Validate => write!(f, "Validate"),
            Self::Reflect => write!(f, "Reflect"),
            Self::RepairWithContext => write!(f, "RepairWithContext"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
            Self::RetryExhausted => write!(f, "RetryExhausted"),
        }
    }
}

/// ```text
/// Enter → Generate
/// Generate → Validate | Failed
/// Validate → Reflect | RepairWithContext
/// Reflect → Success | RepairWithContext
/// RepairWithContext → Generate | RetryExhausted
/// ```
fn is_legal_transition(from: IterationState, to: IterationState) -> bool {
    use IterationState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Enter, Generate)
            | (Generate, Validate)
            | (Validate, Reflect)
            | (Validate, RepairWithContext)
            | (Reflect, Success)
            | (Reflect, RepairWithContext)
            | (RepairWithContext, Generate)
            | (RepairWithContext, RetryExhausted)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: IterationState,
    pub to: IterationState,
    pub iteration: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: IterationState,
    pub to: IterationState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal iteration state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current state, enforces legal transitions, and keeps the full
/// transition log for diagnostics.
#[derive(Debug)]
pub struct StateMachine {
    current: IterationState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: IterationState::Enter,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> IterationState {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn advance(&mut self, to: IterationState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition { from: self.current, to });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(from = %self.current, to = %to, iteration = self.iteration, "state transition");

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(IterationState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IterationState::*;

    #[test]
    fn happy_path_to_success() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, None).unwrap();
        sm.advance(Validate, None).unwrap();
        sm.advance(Reflect, None).unwrap();
        sm.advance(Success, None).unwrap();
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 4);
    }

    #[test]
    fn repair_loop_back_to_generate() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, None).unwrap();
        sm.advance(Validate, None).unwrap();
        sm.advance(RepairWithContext, Some("score below threshold")).unwrap();
        sm.advance(Generate, None).unwrap();
        assert_eq!(sm.current(), Generate);
        assert!(!sm.is_terminal());
    }

    #[test]
    fn retry_exhausted_is_terminal() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, None).unwrap();
        sm.advance(Validate, None).unwrap();
        sm.advance(RepairWithContext, None).unwrap();
        sm.advance(RetryExhausted, Some("max iterations reached")).unwrap();
        assert!(sm.is_terminal());
    }

    #[test]
    fn skipping_a_state_is_illegal() {
        let mut sm = StateMachine::new();
        let err = sm.advance(Validate, None).unwrap_err();
        assert_eq!(err.from, Enter);
        assert_eq!(err.to, Validate);
    }

    #[test]
    fn any_non_terminal_state_can_fail() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, None).unwrap();
        sm.fail("model unreachable").unwrap();
        assert_eq!(sm.current(), Failed);
    }

    #[test]
    fn terminal_states_cannot_transition_further() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, None).unwrap();
        sm.fail("boom").unwrap();
        assert!(sm.advance(Generate, None).is_err());
    }
}
