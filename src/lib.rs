//! koda-core — a bounded generate/validate/reflect/repair loop over a
//! branchable session tree, with model-driven tool synthesis.
//!
//! # Components
//!
//! - [`controller`]: the Iteration Controller, the driving state machine.
//! - [`tree`]: the Tree Session Store, a git-like versioned history of
//!   session nodes with branch/checkout/merge/abandon semantics.
//! - [`extension`]: the Extension Engine, which compiles model-authored Rust
//!   source into a `cdylib` and dlopens it as a new tool.
//! - [`validator`]: the Static Validator, a fixed structural check pipeline.
//! - [`reflector`]: the Reflective Reviewer, a static pass plus optional
//!   model-driven review/repair.
//! - [`prompt`]: the Prompt Composer, assembling system/user prompts.
//! - [`model`] / [`tool`]: external adapter contracts.
//! - [`config`]: `CoreConfig`, loaded from an optional `.koda/config.toml`.
//! - [`truncate`]: UTF-8-safe content truncation shared across tools.

#![allow(clippy::uninlined_format_args)]

pub mod ast;
pub mod config;
pub mod controller;
pub mod error;
pub mod extension;
pub mod model;
pub mod prompt;
pub mod reflector;
pub mod task;
pub mod tool;
pub mod tree;
pub mod truncate;
pub mod validator;

pub use config::CoreConfig;
pub use controller::Controller;
pub use error::{CoreError, CoreResult};
pub use extension::{ExtensionEngine, ExtensionInfo, Tool};
pub use model::{ChatModel, CompletionModel, Message, ModelAdapter, Role};
pub use reflector::Reflector;
pub use task::{CodeArtifact, ReflectionResult, Task, TaskResult};
pub use tool::ToolAdapter;
pub use tree::{NodeStatus, SessionNode, TreeSession, TreeSessionManager};
pub use validator::{CheckOutcome, CheckResult, ValidationReport, Validator};
