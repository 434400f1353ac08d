//! Extension Engine — model-driven tool synthesis, compiled and dynamically
//! loaded as a `cdylib`, with hot-reload and never-raising dispatch.

pub mod engine;

pub use engine::{ExtensionEngine, ExtensionInfo, Tool};
