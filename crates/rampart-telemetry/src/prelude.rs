//! Prelude module - commonly used types for convenient import.
//!
//! Use `use rampart_telemetry::prelude::*;` to import logging setup and
//! operation contexts.

pub use crate::{TelemetryError, TelemetryResult};

pub use crate::{LogConfig, LogFormat, LogTarget, setup_logging};

pub use crate::{OperationContext, OperationGuard};
