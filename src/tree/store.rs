use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::tree::types::{NodeStatus, SessionNode};

fn short_id() -> String {
    Uuid::new_v4().to_string().chars().take(8).collect()
}

/// The tree of all nodes produced while working on one or more related
/// tasks, persisted as a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSession {
    pub session_id: String,
    pub root_node_id: String,
    #[serde(default)]
    pub nodes: HashMap<String, SessionNode>,
    pub current_node_id: String,
    #[serde(default)]
    pub extensions: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl TreeSession {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = SessionNode::new_root(short_id(), root_name);
        let mut nodes = HashMap::new();
        let root_id = root.id.clone();
        nodes.insert(root_id.clone(), root);
        Self {
            session_id: short_id(),
            root_node_id: root_id.clone(),
            nodes,
            current_node_id: root_id,
            extensions: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn node(&self, id: &str) -> CoreResult<&SessionNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| CoreError::unknown_node(&self.session_id, id))
    }

    fn node_mut(&mut self, id: &str) -> CoreResult<&mut SessionNode> {
        let session_id = self.session_id.clone();
        self.nodes
            .get_mut(id)
            .ok_or_else(|| CoreError::unknown_node(session_id, id))
    }

    /// Create a child of `from_node_id` (default: current node), deep-copying
    /// its artifacts and messages. Does not move the cursor.
    pub fn create_branch(&mut self, name: &str, description: &str, from_node_id: Option<&str>) -> CoreResult<String> {
        let parent_id = from_node_id.unwrap_or(&self.current_node_id).to_string();
        let parent = self.node(&parent_id)?;

        let node = SessionNode {
            id: short_id(),
            parent_id: Some(parent_id.clone()),
            name: name.to_string(),
            description: description.to_string(),
            artifacts: parent.artifacts.clone(),
            messages: parent.messages.clone(),
            status: NodeStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            metadata: HashMap::new(),
            children: Vec::new(),
        };

        let node_id = node.id.clone();
        self.nodes.insert(node_id.clone(), node);
        self.node_mut(&parent_id)?.children.push(node_id.clone());

        tracing::debug!(session_id = %self.session_id, parent = %parent_id, child = %node_id, "create_branch");
        Ok(node_id)
    }

    /// Move the cursor to `node_id`.
    pub fn checkout(&mut self, node_id: &str) -> CoreResult<()> {
        self.node(node_id)?;
        self.current_node_id = node_id.to_string();
        tracing::debug!(session_id = %self.session_id, node = %node_id, "checkout");
        Ok(())
    }

    /// Copy `from`'s artifacts over `into`'s (source wins on collision), mark
    /// `from` MERGED. Does not touch `into`'s message log.
    pub fn merge(&mut self, from_node_id: &str, into_node_id: Option<&str>) -> CoreResult<String> {
        let target_id = into_node_id.unwrap_or(&self.current_node_id).to_string();
        self.node(from_node_id)?;
        self.node(&target_id)?;

        let source_artifacts = self.node(from_node_id)?.artifacts.clone();
        {
            let target = self.node_mut(&target_id)?;
            for (k, v) in source_artifacts {
                target.artifacts.insert(k, v);
            }
        }
        {
            let source = self.node_mut(from_node_id)?;
            source.status = NodeStatus::Merged;
            source
                .metadata
                .insert("merged_to".to_string(), serde_json::Value::String(target_id.clone()));
        }

        tracing::debug!(session_id = %self.session_id, from = %from_node_id, into = %target_id, "merge");
        Ok(target_id)
    }

    /// Mark `node_id` ABANDONED. Idempotent; descendants are untouched.
    pub fn abandon(&mut self, node_id: &str) -> CoreResult<()> {
        self.node_mut(node_id)?.status = NodeStatus::Abandoned;
        tracing::debug!(session_id = %self.session_id, node = %node_id, "abandon");
        Ok(())
    }

    pub fn register_extension(&mut self, name: &str, source: &str) {
        self.extensions.insert(name.to_string(), source.to_string());
        tracing::debug!(session_id = %self.session_id, extension = %name, "register_extension");
    }

    pub fn get_extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    pub fn list_extensions(&self) -> Vec<&str> {
        self.extensions.keys().map(String::as_str).collect()
    }

    pub fn get_current_node(&self) -> CoreResult<&SessionNode> {
        self.node(&self.current_node_id)
    }

    pub fn get_current_node_mut(&mut self) -> CoreResult<&mut SessionNode> {
        let id = self.current_node_id.clone();
        self.node_mut(&id)
    }

    /// Root-to-node path (default: root-to-cursor).
    pub fn get_path_to_root(&self, node_id: Option<&str>) -> Vec<&SessionNode> {
        let mut path = Vec::new();
        let mut current_id = Some(node_id.unwrap_or(&self.current_node_id).to_string());
        while let Some(id) = current_id {
            match self.nodes.get(&id) {
                Some(node) => {
                    path.push(node);
                    current_id = node.parent_id.clone();
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    pub fn get_all_branches(&self) -> Vec<&SessionNode> {
        self.nodes.values().filter(|n| n.parent_id.is_some()).collect()
    }

    /// ASCII tree, `git log --graph`-style, with a `*` cursor marker and a
    /// single-letter status sigil per node.
    pub fn get_tree_visualization(&self) -> String {
        let mut lines = Vec::new();
        let Some(root) = self.nodes.get(&self.root_node_id) else {
            return String::new();
        };
        lines.push(format!("[{}] {}", root.status.sigil(), root.name));
        let child_count = root.children.len();
        for (i, child_id) in root.children.iter().enumerate() {
            self.print_node(child_id, "", i == child_count - 1, &mut lines);
        }
        lines.join("\n")
    }

    fn print_node(&self, node_id: &str, prefix: &str, is_last: bool, lines: &mut Vec<String>) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        let marker = if node_id == self.current_node_id { '*' } else { ' ' };
        let connector = if is_last { "└── " } else { "├── " };
        let desc_preview: String = node.description.chars().take(30).collect();
        lines.push(format!("{prefix}{marker}{connector}[{}] {}: {desc_preview}", node.status.sigil(), node.name));

        let extension = if is_last { "    " } else { "│   " };
        let child_count = node.children.len();
        for (i, child_id) in node.children.iter().enumerate() {
            self.print_node(child_id, &format!("{prefix}{extension}"), i == child_count - 1, lines);
        }
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::persistence_failed(path.display().to_string(), e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| CoreError::persistence_failed(path.display().to_string(), e))?;
        tracing::info!(session_id = %self.session_id, path = %path.display(), "save");
        Ok(())
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::persistence_failed(path.display().to_string(), e))?;
        let session: Self = serde_json::from_str(&json)?;
        tracing::info!(session_id = %session.session_id, path = %path.display(), "load");
        Ok(session)
    }
}

/// Manages creation, loading, and switching of multiple sessions under a
/// workspace's `.koda/sessions` directory.
pub struct TreeSessionManager {
    sessions_dir: PathBuf,
    pub current_session: Option<TreeSession>,
}

impl TreeSessionManager {
    pub fn new(workspace: &Path) -> CoreResult<Self> {
        let sessions_dir = workspace.join(".koda").join("sessions");
        std::fs::create_dir_all(&sessions_dir).map_err(|e| CoreError::persistence_failed(sessions_dir.display().to_string(), e))?;
        Ok(Self {
            sessions_dir,
            current_session: None,
        })
    }

    pub fn create_session(&mut self, name: &str) -> &TreeSession {
        self.current_session = Some(TreeSession::new(name));
        self.current_session.as_ref().unwrap()
    }

    pub fn load_session(&mut self, session_id: &str) -> CoreResult<Option<&TreeSession>> {
        let path = self.sessions_dir.join(format!("{session_id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        self.current_session = Some(TreeSession::load(&path)?);
        Ok(self.current_session.as_ref())
    }

    pub fn save_current_session(&self) -> CoreResult<()> {
        if let Some(session) = &self.current_session {
            let path = self.sessions_dir.join(format!("{}.json", session.session_id));
            session.save(&path)?;
        }
        Ok(())
    }

    pub fn list_sessions(&self) -> CoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.sessions_dir).map_err(|e| CoreError::persistence_failed(self.sessions_dir.display().to_string(), e))? {
            let entry = entry.map_err(|e| CoreError::persistence_failed(self.sessions_dir.display().to_string(), e))?;
            if let Some(stem) = entry.path().file_stem() {
                if entry.path().extension().is_some_and(|ext| ext == "json") {
                    ids.push(stem.to_string_lossy().to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn root_has_no_parent_and_is_the_only_one() {
        let session = TreeSession::new("main");
        let root = session.get_current_node().unwrap();
        assert!(root.parent_id.is_none());
        assert_eq!(root.id, session.root_node_id);
    }

    #[test]
    fn branch_deep_copies_parent_artifacts() {
        let mut session = TreeSession::new("main");
        session
            .get_current_node_mut()
            .unwrap()
            .artifacts
            .insert("main.rs".to_string(), "fn main() {}".to_string());

        let child_id = session.create_branch("fix-iter1", "repair attempt", None).unwrap();

        session
            .get_current_node_mut()
            .unwrap()
            .artifacts
            .insert("main.rs".to_string(), "mutated on parent".to_string());

        let child = session.nodes.get(&child_id).unwrap();
        assert_eq!(child.artifacts.get("main.rs").unwrap(), "fn main() {}");
    }

    #[test]
    fn branch_does_not_move_the_cursor() {
        let mut session = TreeSession::new("main");
        let root_id = session.current_node_id.clone();
        session.create_branch("fix-iter1", "repair attempt", None).unwrap();
        assert_eq!(session.current_node_id, root_id);
    }

    #[test]
    fn checkout_unknown_node_is_an_error() {
        let mut session = TreeSession::new("main");
        let err = session.checkout("doesnotexist").unwrap_err();
        assert!(matches!(err, CoreError::UnknownNode { .. }));
    }

    #[test]
    fn merge_overrides_target_artifacts_and_marks_source_merged() {
        let mut session = TreeSession::new("main");
        let child_id = session.create_branch("fix-iter1", "repair", None).unwrap();
        session
            .nodes
            .get_mut(&child_id)
            .unwrap()
            .artifacts
            .insert("main.rs".to_string(), "fixed".to_string());

        let root_id = session.root_node_id.clone();
        session.merge(&child_id, Some(&root_id)).unwrap();

        assert_eq!(session.nodes[&root_id].artifacts.get("main.rs").unwrap(), "fixed");
        assert_eq!(session.nodes[&child_id].status, NodeStatus::Merged);
        assert_eq!(
            session.nodes[&child_id].metadata.get("merged_to").unwrap(),
            &serde_json::Value::String(root_id)
        );
    }

    #[test]
    fn merge_on_disjoint_keys_is_idempotent() {
        let mut session = TreeSession::new("main");
        let root_id = session.root_node_id.clone();
        session
            .get_current_node_mut()
            .unwrap()
            .artifacts
            .insert("a.rs".to_string(), "a".to_string());
        let child_id = session.create_branch("branch", "d", None).unwrap();
        session.nodes.get_mut(&child_id).unwrap().artifacts.clear();
        session
            .nodes
            .get_mut(&child_id)
            .unwrap()
            .artifacts
            .insert("b.rs".to_string(), "b".to_string());

        session.merge(&child_id, Some(&root_id)).unwrap();
        let after_first: HashMap<_, _> = session.nodes[&root_id].artifacts.clone();
        session.merge(&child_id, Some(&root_id)).unwrap();
        assert_eq!(session.nodes[&root_id].artifacts, after_first);
    }

    #[test]
    fn abandon_is_idempotent_and_does_not_touch_children() {
        let mut session = TreeSession::new("main");
        let root_id = session.root_node_id.clone();
        let child_id = session.create_branch("branch", "d", None).unwrap();
        session.abandon(&root_id).unwrap();
        session.abandon(&root_id).unwrap();
        assert_eq!(session.nodes[&root_id].status, NodeStatus::Abandoned);
        assert_eq!(session.nodes[&child_id].status, NodeStatus::Active);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut session = TreeSession::new("main");
        session.create_branch("fix-iter1", "repair", None).unwrap();
        session.register_extension("calc", "fn x() {}");

        let path = dir.path().join("session.json");
        session.save(&path).unwrap();
        let loaded = TreeSession::load(&path).unwrap();

        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.nodes.len(), session.nodes.len());
        assert_eq!(loaded.extensions, session.extensions);
    }

    #[test]
    fn visualization_marks_the_cursor() {
        let mut session = TreeSession::new("main");
        session.create_branch("fix-iter1", "repair attempt", None).unwrap();
        let viz = session.get_tree_visualization();
        assert!(viz.contains("[A] main"));
        assert!(viz.contains("fix-iter1"));
    }

    #[test]
    fn path_to_root_is_root_first() {
        let mut session = TreeSession::new("main");
        let child_id = session.create_branch("child", "d", None).unwrap();
        let grandchild_id = session.create_branch("grandchild", "d", Some(&child_id)).unwrap();
        let path = session.get_path_to_root(Some(&grandchild_id));
        assert_eq!(path[0].id, session.root_node_id);
        assert_eq!(path.last().unwrap().id, grandchild_id);
    }

    #[test]
    fn manager_save_and_reload_by_session_id() {
        let dir = tempdir().unwrap();
        let mut manager = TreeSessionManager::new(dir.path()).unwrap();
        manager.create_session("main");
        let session_id = manager.current_session.as_ref().unwrap().session_id.clone();
        manager.save_current_session().unwrap();

        let mut manager2 = TreeSessionManager::new(dir.path()).unwrap();
        let loaded = manager2.load_session(&session_id).unwrap();
        assert!(loaded.is_some());
        assert_eq!(manager2.list_sessions().unwrap(), vec![session_id]);
    }
}
