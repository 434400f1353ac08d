//! Core data types: `Task`, `CodeArtifact`, `ReflectionResult`, `TaskResult`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable work order submitted to the iteration controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    3
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            requirements: Vec::new(),
            constraints: Vec::new(),
            context: HashMap::new(),
            max_iterations: default_max_iterations(),
        }
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Render the task as a prompt fragment: description, numbered
    /// requirements, and (if present) numbered constraints.
    pub fn to_prompt(&self) -> String {
        let mut lines = vec![format!("Task: {}", self.description), String::new(), "Requirements:".to_string()];
        for (i, req) in self.requirements.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, req));
        }
        if !self.constraints.is_empty() {
            lines.push(String::new());
            lines.push("Constraints:".to_string());
            for (i, cons) in self.constraints.iter().enumerate() {
                lines.push(format!("{}. {}", i + 1, cons));
            }
        }
        lines.join("\n")
    }
}

/// A named text blob attached to a session node, typically a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub filename: String,
    pub content: String,
}

pub const MAIN_ARTIFACT_CANDIDATES: &[&str] = &["main.rs", "main.py", "index.py", "app.py"];

/// Model-assisted code review plus optional rewrite suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReflectionResult {
    pub has_issues: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub improved_code: Option<String>,
}

impl ReflectionResult {
    pub fn can_fix(&self) -> bool {
        self.has_issues && !self.issues.is_empty() && self.improved_code.is_some()
    }
}

/// Outcome of running a task through the iteration controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub source: String,
    pub iterations: u32,
    pub validation_score: f64,
    pub reflection: Option<ReflectionResult>,
    pub terminal_node_id: String,
    pub session_id: String,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}
