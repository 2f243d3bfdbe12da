//! Shared value types for the node contract.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants and participate in contract checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cardinality
// ---------------------------------------------------------------------------

/// Expected number of output Thoughts from one successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly this many outputs. Always at least 1.
    Exactly(usize),
    /// One or more outputs; the count is decided by the run.
    Variable,
}

impl Cardinality {
    /// A single output.
    pub const ONE: Self = Self::Exactly(1);

    /// Creates a fixed cardinality, returning `None` for zero.
    pub fn exactly(n: usize) -> Option<Self> {
        (n > 0).then_some(Self::Exactly(n))
    }

    /// Returns `true` for a fixed cardinality of one.
    pub fn is_one(self) -> bool {
        self == Self::ONE
    }

    /// Returns `true` if a run producing `count` outputs satisfies this cardinality.
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::Variable => count >= 1,
        }
    }

    /// Cardinality of `k` back-to-back runs.
    pub fn times(self, k: usize) -> Self {
        match self {
            Self::Exactly(n) => Self::Exactly(n * k),
            Self::Variable => Self::Variable,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::Variable => f.write_str("one or more"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
