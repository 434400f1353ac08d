//! Tool adapter contract.
//!
//! The core consumes a filesystem/shell surface; it does not implement one.
//! This trait is the seam an embedder plugs a real tool layer into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResult {
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResult {
    pub success: bool,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellResult {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
}

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn read(&self, path: &str, offset: Option<usize>, limit: Option<usize>) -> CoreResult<ReadResult>;
    async fn write(&self, path: &str, content: &str) -> CoreResult<WriteResult>;
    async fn edit(&self, path: &str, old_text: &str, new_text: &str) -> CoreResult<EditResult>;
    async fn bash(&self, command: &str, timeout_secs: Option<u64>) -> CoreResult<ShellResult>;
}
