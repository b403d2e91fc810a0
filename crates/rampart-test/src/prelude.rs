//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_test::prelude::*;` in test modules.

// Scripted seams
pub use crate::{RecordingRollback, ScriptedDecider, ScriptedHandler};

// Fixtures
pub use crate::{
    file_modify_op, init_test_logging, temp_workspace, temp_workspace_with, test_config,
    test_engine,
};
