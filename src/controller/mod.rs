//! Iteration Controller — the bounded generate/validate/reflect/repair state
//! machine driving a single task to acceptance or exhaustion.

pub mod iteration;
pub mod state_machine;

pub use iteration::Controller;
pub use state_machine::{IllegalTransition, IterationState, StateMachine, TransitionRecord};
