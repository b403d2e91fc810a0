//! Common types used throughout Rampart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp wrapper for consistent handling throughout Rampart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Check if this timestamp is in the past.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 < Utc::now()
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Risk tier assigned to every command and operation before it may run.
///
/// Ordered from least to most dangerous so that the tier of a compound
/// command is the maximum of its segments.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Read-only: listing, reading, status queries.
    Safe,
    /// Mutates state. The default for anything unrecognized.
    #[default]
    Risky,
    /// Destructive or privilege-escalating. Never auto-approved.
    Dangerous,
}

impl RiskTier {
    /// Whether an operation of this tier can be approved without asking.
    #[must_use]
    pub fn is_auto_approvable(self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Whether stored preferences may be consulted for this tier.
    #[must_use]
    pub fn allows_preferences(self) -> bool {
        !matches!(self, Self::Dangerous)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Risky => write!(f, "risky"),
            Self::Dangerous => write!(f, "dangerous"),
        }
    }
}
