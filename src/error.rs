//! Error taxonomy for the core.
//!
//! Every fallible operation in this crate returns `CoreResult<T>`, except the
//! single public entry point (`Controller::run_task`), which always resolves
//! to a `TaskResult` and never propagates an error past its own boundary.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("node {node_id} not found in session {session_id}")]
    UnknownNode { session_id: String, node_id: String },

    #[error("extension source for {name} failed to parse: {message}")]
    InvalidSource { name: String, message: String },

    #[error("extension {name} is not registered")]
    ExtensionNotFound { name: String },

    #[error("extension {name} failed to load: {message}")]
    ExtensionLoadFailed { name: String, message: String },

    #[error("model call failed: {message}")]
    ModelFailed { message: String },

    #[error("tool {tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("persistence failed for {path}: {source}")]
    PersistenceFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task cancelled at iteration {iteration}")]
    Cancelled { iteration: u32 },

    #[error("iteration budget ({max_iterations}) exhausted without acceptance")]
    IterationExhausted { max_iterations: u32 },

    #[error("offset {offset} is past the end of content ({total_lines} lines)")]
    OffsetOutOfRange { offset: usize, total_lines: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn unknown_node(session_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::UnknownNode {
            session_id: session_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn invalid_source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn extension_load_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtensionLoadFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn model_failed(message: impl Into<String>) -> Self {
        Self::ModelFailed {
            message: message.into(),
        }
    }

    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn persistence_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::PersistenceFailed {
            path: path.into(),
            source,
        }
    }

    /// Whether a caller may reasonably retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelFailed { .. } | Self::ToolFailed { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_formats_both_ids() {
        let err = CoreError::unknown_node("sess1", "node1");
        let msg = err.to_string();
        assert!(msg.contains("sess1"));
        assert!(msg.contains("node1"));
    }

    #[test]
    fn model_and_tool_failures_are_retryable() {
        assert!(CoreError::model_failed("timeout").is_retryable());
        assert!(CoreError::tool_failed("bash", "nonzero exit").is_retryable());
        assert!(!CoreError::invalid_source("x", "parse error").is_retryable());
    }
}
