//! Fixtures for workspaces, operations, configuration and engines.

use rampart_config::Config;
use rampart_core::Operation;
use rampart_runtime::{Engine, EngineResult};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::mocks::ScriptedHandler;

/// An empty temporary workspace, removed on drop.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("failed to create temporary workspace")
}

/// A temporary workspace holding `files` (relative path, content).
///
/// # Panics
///
/// Panics if a file cannot be written.
#[must_use]
pub fn temp_workspace_with(files: &[(&str, &str)]) -> TempDir {
    let workspace = temp_workspace();
    for (path, content) in files {
        let full = workspace.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture directory");
        }
        std::fs::write(&full, content).expect("failed to write fixture file");
    }
    workspace
}

/// A modification of `path` planned against its current content in `root`.
///
/// The read checksum is taken from disk, so a later change to the file is
/// detected as a conflict. A missing file yields an operation without one.
#[must_use]
pub fn file_modify_op(root: &Path, path: &str, content: &str) -> Operation {
    let op = Operation::file_modify(path, content);
    match std::fs::read(root.join(path)) {
        Ok(current) => op.read_from(&current),
        Err(_) => op,
    }
}

/// Configuration for tests: short retry delays, SAFE auto-approval on and
/// a learned store that flushes on every update.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.executor.retry.initial_delay_ms = 10;
    config.executor.retry.max_delay_ms = 50;
    config.executor.default_timeout_secs = 30;
    config.recovery.flush_every = 1;
    config
}

/// An engine over `root` using [`test_config`] with `handler` registered.
///
/// # Errors
///
/// Returns an error if the engine cannot be opened.
pub async fn test_engine(root: &Path, handler: ScriptedHandler) -> EngineResult<Engine> {
    let engine = Engine::open(test_config(), root)?;
    engine.register_handler(Arc::new(handler)).await;
    Ok(engine)
}

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test; only the first call installs it.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::ContentHash;

    #[test]
    fn test_workspace_with_files() {
        let workspace = temp_workspace_with(&[("a/b.txt", "hello"), ("c.txt", "x")]);
        assert_eq!(
            std::fs::read_to_string(workspace.path().join("a/b.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_modify_op_reads_checksum() {
        let workspace = temp_workspace_with(&[("config.yaml", "a: 1\n")]);
        let op = file_modify_op(workspace.path(), "config.yaml", "a: 2\n");
        assert_eq!(op.read_checksum, Some(ContentHash::hash(b"a: 1\n")));
        assert!(
            file_modify_op(workspace.path(), "missing.txt", "")
                .read_checksum
                .is_none()
        );
    }

    #[test]
    fn test_config_is_valid() {
        assert!(rampart_config::validate::validate(&test_config()).is_ok());
    }
}
