//! Rampart Runtime - the engine facade.
//!
//! This crate wires the components into one [`Engine`] per workspace and
//! exposes the entry points upstream layers use:
//!
//! - [`Engine::submit_operation`] / [`Engine::submit_batch`]: conflict
//!   preflight, approval, undo point, then apply in submission order
//! - [`Engine::execute_command`] / [`Engine::execute_with_retry`]
//! - [`Engine::rollback`] / [`Engine::undo`]
//! - [`Engine::analyze_error`], [`Engine::suggest_fixes`],
//!   [`Engine::apply_fix`]
//!
//! Configuration comes from `rampart-config`; [`config_bridge`] converts it
//! into the settings each component takes.
//!
//! # Example
//!
//! ```rust,no_run
//! use rampart_core::Operation;
//! use rampart_exec::ExecOptions;
//! use rampart_runtime::Engine;
//!
//! # async fn example() -> rampart_runtime::EngineResult<()> {
//! let engine = Engine::load("/path/to/project")?;
//! let report = engine
//!     .submit_operation(
//!         Operation::file_modify("config.yaml", "debug: true\n"),
//!         &ExecOptions::new(),
//!     )
//!     .await?;
//! if !report.all_succeeded() {
//!     engine.undo().await?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod applier;
pub mod config_bridge;
/// Engine error types.
pub mod error;

mod engine;

pub use applier::FileApplier;
pub use engine::{BatchReport, Engine, ExecutorRollback, OperationOutcome, OperationReport};
pub use error::{EngineError, EngineResult};
