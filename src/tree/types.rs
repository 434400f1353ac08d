use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Success,
    Failed,
    Merged,
    Abandoned,
}

impl NodeStatus {
    /// Terminal statuses are frozen: a node in one of these must not be
    /// re-checked-out as a live working node.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Abandoned)
    }

    /// First letter of the status name, uppercased, as used by the tree
    /// visualization's per-node sigil.
    pub fn sigil(self) -> char {
        match self {
            Self::Active => 'A',
            Self::Success => 'S',
            Self::Failed => 'F',
            Self::Merged => 'M',
            Self::Abandoned => 'A',
        }
    }
}

/// A single snapshot of development state: artifacts, message log, status,
/// and its place in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub artifacts: HashMap<String, String>,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,

    pub status: NodeStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub children: Vec<String>,
}

impl SessionNode {
    pub fn new_root(id: String, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            name: name.into(),
            description: "Root session".to_string(),
            artifacts: HashMap::new(),
            messages: Vec::new(),
            status: NodeStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            metadata: HashMap::new(),
            children: Vec::new(),
        }
    }
}
