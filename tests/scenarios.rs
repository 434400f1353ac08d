//! End-to-end walkthroughs spanning the Iteration Controller, Tree Session
//! Store, and Extension Engine together, using the in-crate `ScriptedModel`
//! test double rather than a live model.

use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use koda_core::model::test_support::ScriptedModel;
use koda_core::{Controller, CoreConfig, ExtensionEngine, ExtensionInfo, ModelAdapter, NodeStatus, Task, TreeSession, TreeSessionManager};

const GOOD_RUST: &str = r#"
use std::fmt;

/// Adds two numbers, checking for overflow.
pub fn add(a: i32, b: i32) -> Result<i32, fmt::Error> {
    let sum = checked_add(a, b)?;
    Ok(sum)
}

fn checked_add(a: i32, b: i32) -> Result<i32, fmt::Error> {
    Ok(a + b)
}
"#;

const BAD_RUST: &str = "const X: i32 = 1;";

const NO_ISSUES: &str = "ISSUES:\nSUGGESTIONS:\nCAN_FIX: no\nCONFIDENCE: 0.95";

fn scripted(responses: Vec<&str>) -> ModelAdapter {
    ModelAdapter::Completion(Box::new(ScriptedModel::new(responses)))
}

/// S1: clean code on the first pass, clean reflection, accepted immediately.
/// Also confirms the terminal node is persisted to disk on success.
#[tokio::test]
async fn happy_path_accepts_on_first_iteration() {
    let dir = tempdir().unwrap();
    let model = scripted(vec![GOOD_RUST, NO_ISSUES]);
    let controller = Controller::with_workspace(CoreConfig::default(), dir.path().to_path_buf());
    let task = Task::new("add two numbers").with_requirement("handle integer overflow");
    let mut session = TreeSession::new("main");

    let result = controller.run_task(&task, &mut session, &model, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.validation_score, 100.0);
    assert_eq!(session.get_current_node().unwrap().status, NodeStatus::Success);

    let persisted_path = dir.path().join(".koda").join("sessions").join(format!("{}.json", session.session_id));
    let persisted = TreeSession::load(&persisted_path).unwrap();
    assert_eq!(persisted.get_current_node().unwrap().status, NodeStatus::Success);
    assert_eq!(persisted.get_current_node().unwrap().artifacts.get("main.rs"), session.get_current_node().unwrap().artifacts.get("main.rs"));
}

/// S2: validation passes but reflection finds an issue with a fix on offer;
/// the controller folds the fix forward and the next iteration is clean.
#[tokio::test]
async fn repair_via_reflection_then_success() {
    let flagged_reflection = "ISSUES:\n- magic number should be named\nSUGGESTIONS:\n- extract a constant\nCAN_FIX: yes\nCONFIDENCE: 0.8";
    let fix = "```rust\nfn f() {}\n```";
    let model = scripted(vec![GOOD_RUST, flagged_reflection, fix, GOOD_RUST, NO_ISSUES]);
    let controller = Controller::new(CoreConfig::default());
    let task = Task::new("add two numbers");
    let mut session = TreeSession::new("main");

    let result = controller.run_task(&task, &mut session, &model, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.iterations, 2);
    assert!(session.get_all_branches().len() >= 1);
}

/// S3: every attempt stays below the acceptance threshold; the controller
/// reports failure once the task's iteration budget is spent. Also confirms
/// the terminal node is persisted to disk on exhaustion, not just success.
#[tokio::test]
async fn iteration_exhaustion_reports_failure_without_panicking() {
    let dir = tempdir().unwrap();
    let model = scripted(vec![BAD_RUST, BAD_RUST, BAD_RUST]);
    let controller = Controller::with_workspace(CoreConfig::default(), dir.path().to_path_buf());
    let mut task = Task::new("add two numbers");
    task.max_iterations = 3;
    let mut session = TreeSession::new("main");

    let result = controller.run_task(&task, &mut session, &model, &CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.iterations, 3);
    assert_eq!(session.get_all_branches().len(), 2);
    assert!(result.error_message.is_some());

    let persisted_path = dir.path().join(".koda").join("sessions").join(format!("{}.json", session.session_id));
    let persisted = TreeSession::load(&persisted_path).unwrap();
    assert_eq!(persisted.nodes[&result.terminal_node_id].status, NodeStatus::Failed);
}

/// S4: branch off the root, mutate the branch's artifacts, merge back; the
/// source branch is marked merged and the target gains its artifacts.
#[tokio::test]
async fn branch_and_merge_round_trip() {
    let mut session = TreeSession::new("main");
    let root_id = session.root_node_id.clone();
    session
        .get_current_node_mut()
        .unwrap()
        .artifacts
        .insert("main.rs".to_string(), "fn main() {}".to_string());

    let branch_id = session.create_branch("experiment", "try a different approach", None).unwrap();
    session
        .nodes
        .get_mut(&branch_id)
        .unwrap()
        .artifacts
        .insert("main.rs".to_string(), "fn main() { println!(\"hi\"); }".to_string());

    session.merge(&branch_id, Some(&root_id)).unwrap();

    assert_eq!(session.nodes[&root_id].artifacts["main.rs"], "fn main() { println!(\"hi\"); }");
    assert_eq!(session.nodes[&branch_id].status, NodeStatus::Merged);
    assert_eq!(session.nodes[&branch_id].metadata["merged_to"], serde_json::json!(root_id));
}

/// S5: synthesize an extension from a model reply, register it, and confirm
/// it is listed and deletable. Compiling and dlopening the result requires a
/// real `rustc` on PATH, so that half of the pipeline is exercised by
/// `extension::engine`'s own unit tests rather than here.
#[tokio::test]
async fn extension_synthesis_then_registration() {
    let dir = tempdir().unwrap();
    let mut engine = ExtensionEngine::new(dir.path().to_path_buf(), Duration::from_secs(30)).unwrap();
    let model = scripted(vec!["```rust\npub fn greet(name: &str) -> String { format!(\"hi {name}\") }\n```"]);

    let info: ExtensionInfo = engine
        .generate("greeter", "greet a person by name", &["accept a name argument".to_string()], &model)
        .await
        .unwrap();

    engine.register_extension(info.clone());
    assert_eq!(engine.list_extensions(), vec!["greeter"]);
    assert_eq!(engine.get_extension("greeter").unwrap().code, info.code);
    assert!(engine.delete("greeter"));
    assert!(engine.list_extensions().is_empty());
}

/// S6: a session created, branched, and saved survives a reload through a
/// fresh manager instance pointed at the same workspace.
#[tokio::test]
async fn session_persistence_round_trip() {
    let dir = tempdir().unwrap();

    let session_id = {
        let mut manager = TreeSessionManager::new(dir.path()).unwrap();
        manager.create_session("main");
        manager
            .current_session
            .as_mut()
            .unwrap()
            .create_branch("fix-iter1", "repair attempt", None)
            .unwrap();
        manager.save_current_session().unwrap();
        manager.current_session.as_ref().unwrap().session_id.clone()
    };

    let mut reloaded_manager = TreeSessionManager::new(dir.path()).unwrap();
    let (loaded_session_id, node_count) = {
        let reloaded = reloaded_manager.load_session(&session_id).unwrap().unwrap();
        (reloaded.session_id.clone(), reloaded.nodes.len())
    };

    assert_eq!(loaded_session_id, session_id);
    assert_eq!(node_count, 2);
    assert_eq!(reloaded_manager.list_sessions().unwrap(), vec![session_id]);
}
