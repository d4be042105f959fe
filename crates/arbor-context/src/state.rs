//! Lifecycle states of a context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a context. Transitions only move forward:
/// `Active` → `Ending` → `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Context is active
    Active,
    /// Context is in the process of ending
    Ending,
    /// Context has ended
    Ended,
}

impl ContextState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Ended => "ended",
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
