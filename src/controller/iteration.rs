//! The driving loop: generate, validate, reflect, repair, bounded by
//! `task.max_iterations`. The one public entry point that never propagates
//! an error past its own boundary.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::controller::state_machine::{IterationState, StateMachine};
use crate::model::ModelAdapter;
use crate::reflector::Reflector;
use crate::task::{CodeArtifact, ReflectionResult, Task, TaskResult};
use crate::tree::{NodeStatus, TreeSession};
use crate::validator::Validator;

pub struct Controller {
    config: CoreConfig,
    validator: Validator,
    reflector: Reflector,
    workspace: Option<PathBuf>,
}

impl Controller {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            validator: Validator::new(),
            reflector: Reflector::new(),
            workspace: None,
        }
    }

    /// Like [`Controller::new`], but persists the session to
    /// `workspace/.koda/sessions/{session_id}.json` (the same layout
    /// `TreeSessionManager` uses) at every terminal transition of
    /// `run_task`.
    pub fn with_workspace(config: CoreConfig, workspace: PathBuf) -> Self {
        Self {
            config,
            validator: Validator::new(),
            reflector: Reflector::new(),
            workspace: Some(workspace),
        }
    }

    /// No-op when constructed without a workspace. Failures to persist are
    /// logged, not propagated: `run_task` never returns an error.
    fn persist(&self, session: &TreeSession) {
        let Some(workspace) = &self.workspace else {
            return;
        };
        let path = workspace.join(".koda").join("sessions").join(format!("{}.json", session.session_id));
        if let Err(e) = session.save(&path) {
            tracing::warn!(session_id = %session.session_id, error = %e, "failed to persist session");
        }
    }

    /// Drive `task` to acceptance or exhaustion, starting from `session`'s
    /// current cursor. Always returns a `TaskResult`; never propagates an
    /// error.
    pub async fn run_task(&self, task: &Task, session: &mut TreeSession, model: &ModelAdapter, cancel: &CancellationToken) -> TaskResult {
        let mut sm = StateMachine::new();
        let mut current_node_id = session.current_node_id.clone();
        let mut best_source = String::new();
        let mut best_score = 0.0_f64;
        let mut last_reflection: Option<ReflectionResult> = None;
        let mut iteration: u32 = 0;
        let mut succeeded = false;

        while iteration < task.max_iterations {
            iteration += 1;
            sm.set_iteration(iteration);

            if cancel.is_cancelled() {
                let _ = sm.fail("cancelled");
                self.persist(session);
                return TaskResult {
                    success: false,
                    source: best_source,
                    iterations: iteration,
                    validation_score: best_score,
                    reflection: last_reflection,
                    terminal_node_id: current_node_id,
                    session_id: session.session_id.clone(),
                    error_message: Some(format!("cancelled at iteration {iteration}")),
                    completed_at: Utc::now(),
                };
            }

            if let Err(e) = sm.advance(IterationState::Generate, None) {
                tracing::error!(error = %e, "unreachable iteration state transition");
            }

            let repair_context = Self::build_repair_context(session, &current_node_id);
            let prompt = format!("{}{repair_context}", crate::prompt::iteration_user_prompt(&task.to_prompt(), iteration));

            let source = match model
                .generate("You are an autonomous coding agent. Write complete, runnable Rust code.", &prompt)
                .await
            {
                Ok(text) => Self::clean_code(&text),
                Err(e) => {
                    let _ = sm.fail("generation failed");
                    self.persist(session);
                    return TaskResult {
                        success: false,
                        source: best_source,
                        iterations: iteration,
                        validation_score: best_score,
                        reflection: last_reflection,
                        terminal_node_id: current_node_id,
                        session_id: session.session_id.clone(),
                        error_message: Some(e.to_string()),
                        completed_at: Utc::now(),
                    };
                }
            };
            best_source = source.clone();

            if let Err(e) = sm.advance(IterationState::Validate, None) {
                tracing::error!(error = %e, "unreachable iteration state transition");
            }

            let artifacts = vec![CodeArtifact {
                filename: "main.rs".to_string(),
                content: source.clone(),
            }];
            let report = self.validator.validate(&artifacts);
            tracing::info!(iteration, score = report.score, passed = report.passed, "validation");

            if report.score > best_score {
                best_score = report.score;
            }

            if report.passed && report.score >= self.config.acceptance_threshold {
                if let Err(e) = sm.advance(IterationState::Reflect, None) {
                    tracing::error!(error = %e, "unreachable iteration state transition");
                }

                let reflection = self.reflector.reflect(&artifacts, Some(&report), Some(model)).await;
                tracing::info!(confidence = reflection.confidence, issues = reflection.issues.len(), "reflection");

                if !reflection.has_issues {
                    let _ = sm.advance(IterationState::Success, None);
                    last_reflection = Some(reflection);
                    succeeded = true;
                    Self::finalize_node(session, &current_node_id, &best_source, true);
                    self.persist(session);
                    break;
                }

                if let Some(improved) = &reflection.improved_code {
                    best_source = improved.clone();
                }
                last_reflection = Some(reflection);
            }

            Self::finalize_node(session, &current_node_id, &best_source, false);

            if let Err(e) = sm.advance(IterationState::RepairWithContext, Some("score below acceptance threshold")) {
                tracing::error!(error = %e, "unreachable iteration state transition");
            }

            if iteration < task.max_iterations && self.config.branching_enabled {
                let branch_name = format!("fix-iter{iteration}");
                let branch_description = format!("repair attempt after iteration {iteration}");
                match session.create_branch(&branch_name, &branch_description, Some(&current_node_id)) {
                    Ok(new_id) => {
                        current_node_id = new_id.clone();
                        if let Err(e) = session.checkout(&new_id) {
                            tracing::warn!(error = %e, "failed to checkout repair branch");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to create repair branch"),
                }
            }
        }

        if !succeeded {
            let _ = sm.advance(IterationState::RetryExhausted, Some("max iterations reached"));
            self.persist(session);
        }

        TaskResult {
            success: succeeded,
            source: best_source,
            iterations: iteration,
            validation_score: best_score,
            reflection: last_reflection,
            terminal_node_id: current_node_id,
            session_id: session.session_id.clone(),
            error_message: if succeeded {
                None
            } else {
                Some(format!("failed after {iteration} iterations, best score {best_score:.1}"))
            },
            completed_at: Utc::now(),
        }
    }

    fn finalize_node(session: &mut TreeSession, node_id: &str, source: &str, success: bool) {
        if let Some(node) = session.nodes.get_mut(node_id) {
            node.artifacts.insert("main.rs".to_string(), source.to_string());
            node.status = if success { NodeStatus::Success } else { NodeStatus::Failed };
            node.completed_at = Some(Utc::now());
        }
    }

    /// Pulls the immediate parent's `main.rs`, truncated to 500 characters,
    /// into the next generate prompt — the same continuity mechanism the
    /// original's `_build_context` provides via the branch tree rather than
    /// a carried-forward variable.
    fn build_repair_context(session: &TreeSession, node_id: &str) -> String {
        let path = session.get_path_to_root(Some(node_id));
        if path.len() > 1 {
            let parent = path[path.len() - 2];
            if let Some(prev) = parent.artifacts.get("main.rs") {
                let preview: String = prev.chars().take(500).collect();
                return format!("\n\nPrevious version:\n```rust\n{preview}\n```");
            }
        }
        String::new()
    }

    fn clean_code(code: &str) -> String {
        let mut code = code.trim();
        if let Some(rest) = code.strip_prefix("```rust") {
            code = rest;
        } else if let Some(rest) = code.strip_prefix("```") {
            code = rest;
        }
        code.trim().trim_end_matches("```").trim().to_string()
    }
}
