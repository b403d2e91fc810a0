//! Shared helpers for the integration tests.

#![allow(dead_code)]

use rampart_config::Config;
use rampart_runtime::Engine;
use rampart_test::{ScriptedHandler, init_test_logging, temp_workspace, test_config};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A fresh workspace and an engine over it with `handler` registered.
pub async fn engine_with(handler: &ScriptedHandler) -> (TempDir, Engine) {
    let workspace = temp_workspace();
    let engine = reopen(workspace.path(), handler).await;
    (workspace, engine)
}

/// An engine over an existing workspace.
pub async fn reopen(root: &Path, handler: &ScriptedHandler) -> Engine {
    open_with_config(root, test_config(), handler).await
}

/// An engine over `root` with an explicit configuration.
pub async fn open_with_config(root: &Path, config: Config, handler: &ScriptedHandler) -> Engine {
    init_test_logging();
    let engine = Engine::open(config, root).unwrap();
    engine.register_handler(Arc::new(handler.clone())).await;
    engine
}
