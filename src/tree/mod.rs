//! Tree Session Store — a git-like versioned history of agent states, with
//! branch/checkout/merge/abandon semantics and a session-scoped extension
//! registry, persisted as a single JSON document per session.

pub mod store;
pub mod types;

pub use store::{TreeSession, TreeSessionManager};
pub use types::{NodeStatus, SessionNode};
