//! Rampart Test - shared test utilities for the Rampart engine.
//!
//! This crate provides scripted implementations of the human-in-the-loop
//! seams and fixtures for building workspaces and engines in tests. Use it
//! as a dev-dependency.
//!
//! ```toml
//! [dev-dependencies]
//! rampart-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use rampart_test::{ScriptedHandler, temp_workspace, test_engine};
//! use rampart_approval::ApprovalDecision;
//!
//! #[tokio::test]
//! async fn test_rejected_write() {
//!     let workspace = temp_workspace();
//!     let handler = ScriptedHandler::new().with_response(ApprovalDecision::reject("no"));
//!     let engine = test_engine(workspace.path(), handler.clone()).await.unwrap();
//!     // ...
//!     assert_eq!(handler.call_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
