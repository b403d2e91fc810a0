//! Rampart Telemetry - logging and tracing setup.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`] built on `tracing-subscriber`, with
//!   rolling file output through `tracing-appender`
//! - [`OperationContext`] for correlating the log lines of one submission,
//!   execution or recovery attempt
//!
//! # Example
//!
//! ```rust,no_run
//! use rampart_telemetry::{LogConfig, LogFormat, OperationContext, setup_logging};
//!
//! # fn main() -> Result<(), rampart_telemetry::TelemetryError> {
//! setup_logging(&LogConfig::new("debug").with_format(LogFormat::Json))?;
//!
//! let ctx = OperationContext::new("executor", "execute");
//! let _entered = ctx.span().entered();
//! tracing::info!(command = "cargo test", "running");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{OperationContext, OperationGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
