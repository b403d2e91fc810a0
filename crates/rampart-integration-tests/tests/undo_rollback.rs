//! Undo points and rollback through the engine.

mod common;

use rampart_approval::INVERSE_METADATA_KEY;
use rampart_core::Operation;
use rampart_exec::ExecOptions;
use rampart_test::{RecordingRollback, ScriptedHandler, file_modify_op, test_config};

const BINARY: &[u8] = b"\x89PNG\r\n\x1a\n\x00\xffraw\r\nbytes";

#[tokio::test]
async fn test_modify_and_delete_roll_back_byte_identical() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    let root = workspace.path();
    std::fs::write(root.join("logo.png"), BINARY).unwrap();
    std::fs::write(root.join("notes.txt"), "line one\r\nline two").unwrap();

    let report = engine
        .submit_batch(
            vec![
                Operation::file_modify("logo.png", "replaced"),
                Operation::file_delete("notes.txt"),
                Operation::file_create("new/dir/file.txt", "fresh"),
            ],
            &ExecOptions::new(),
        )
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert!(!root.join("notes.txt").exists());
    assert_eq!(std::fs::read_to_string(root.join("logo.png")).unwrap(), "replaced");

    assert!(engine.undo().await.unwrap());
    assert_eq!(std::fs::read(root.join("logo.png")).unwrap(), BINARY);
    assert_eq!(
        std::fs::read(root.join("notes.txt")).unwrap(),
        b"line one\r\nline two"
    );
    assert!(!root.join("new/dir/file.txt").exists());
}

#[tokio::test]
async fn test_second_rollback_is_a_noop() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    let path = workspace.path().join("a.txt");
    std::fs::write(&path, "v1").unwrap();

    engine
        .submit_operation(
            file_modify_op(workspace.path(), "a.txt", "v2"),
            &ExecOptions::new(),
        )
        .await
        .unwrap();
    assert!(engine.undo().await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");

    assert!(!engine.undo().await.unwrap());
    assert!(engine.undo_history().await.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");
}

#[tokio::test]
async fn test_undo_survives_restart() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    let path = workspace.path().join("settings.toml");
    std::fs::write(&path, "debug = false\n").unwrap();

    engine
        .submit_operation(
            file_modify_op(workspace.path(), "settings.toml", "debug = true\n"),
            &ExecOptions::new(),
        )
        .await
        .unwrap();
    drop(engine);

    let engine = common::reopen(workspace.path(), &handler).await;
    let history = engine.undo_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operations[0].target, "settings.toml");

    assert!(engine.undo().await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "debug = false\n");
}

#[tokio::test]
async fn test_history_is_bounded() {
    let workspace = rampart_test::temp_workspace();
    let mut config = test_config();
    config.undo.max_points = 2;
    let handler = ScriptedHandler::approving();
    let engine = common::open_with_config(workspace.path(), config, &handler).await;
    let path = workspace.path().join("counter.txt");
    std::fs::write(&path, "0").unwrap();

    for value in ["1", "2", "3"] {
        engine
            .submit_operation(
                file_modify_op(workspace.path(), "counter.txt", value),
                &ExecOptions::new(),
            )
            .await
            .unwrap();
    }
    assert_eq!(engine.undo_history().await.len(), 2);

    assert!(engine.undo().await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "2");
    assert!(engine.undo().await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
    // The oldest point was evicted.
    assert!(!engine.undo().await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
}

#[tokio::test]
async fn test_vetoed_rollback_keeps_the_point() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    engine
        .submit_operation(Operation::file_create("a.txt", "x"), &ExecOptions::new())
        .await
        .unwrap();

    let hook = RecordingRollback::vetoing();
    assert!(!engine.rollback(&hook).await.unwrap());
    assert_eq!(hook.points().len(), 1);
    assert_eq!(engine.undo_history().await.len(), 1);
    assert!(workspace.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_inverse_commands_run_newest_first() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;

    let report = engine
        .submit_batch(
            vec![
                Operation::command("mkdir out")
                    .with_metadata(INVERSE_METADATA_KEY, "rmdir out"),
                Operation::command("mkdir out/logs")
                    .with_metadata(INVERSE_METADATA_KEY, "rmdir out/logs"),
                Operation::file_create("README.md", "# demo\n"),
            ],
            &ExecOptions::new(),
        )
        .await
        .unwrap();
    assert!(report.all_succeeded());

    let hook = RecordingRollback::new();
    assert!(engine.rollback(&hook).await.unwrap());
    assert_eq!(hook.inverses(), vec!["rmdir out/logs", "rmdir out"]);
    assert!(!workspace.path().join("README.md").exists());
}

#[tokio::test]
async fn test_undo_runs_inverses_through_the_executor() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    engine
        .submit_batch(
            vec![
                Operation::command("mkdir out")
                    .with_metadata(INVERSE_METADATA_KEY, "rmdir out"),
                Operation::command("mkdir out/logs")
                    .with_metadata(INVERSE_METADATA_KEY, "rmdir out/logs"),
            ],
            &ExecOptions::new(),
        )
        .await
        .unwrap();
    assert!(workspace.path().join("out/logs").is_dir());

    assert!(engine.undo().await.unwrap());
    assert!(!workspace.path().join("out").exists());
}

#[tokio::test]
async fn test_failed_inverse_leaves_files_alone() {
    let handler = ScriptedHandler::approving();
    let (workspace, engine) = common::engine_with(&handler).await;
    engine
        .submit_batch(
            vec![
                Operation::command("mkdir out")
                    .with_metadata(INVERSE_METADATA_KEY, "rmdir out"),
                Operation::file_create("out.txt", "generated"),
            ],
            &ExecOptions::new(),
        )
        .await
        .unwrap();

    let hook = RecordingRollback::failing_inverses();
    assert!(!engine.rollback(&hook).await.unwrap());
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("out.txt")).unwrap(),
        "generated"
    );
    assert_eq!(engine.undo_history().await.len(), 1);
}

#[tokio::test]
async fn test_rejected_batch_records_no_undo_point() {
    let handler = ScriptedHandler::new();
    let (_workspace, engine) = common::engine_with(&handler).await;
    let report = engine
        .submit_operation(Operation::file_create("a.txt", "x"), &ExecOptions::new())
        .await
        .unwrap();
    assert!(report.undo_point.is_none());
    assert!(engine.undo_history().await.is_empty());
}
