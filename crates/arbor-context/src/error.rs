//! Error types for context operations.

use crate::context::ContextId;
use crate::state::ContextState;
use thiserror::Error;

/// Errors that can occur during context operations.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Operation requires an active context
    #[error("Context {id} is not active (state: {state})")]
    InactiveContext { id: ContextId, state: ContextState },

    /// Axis name outside the recognized set
    #[error("Invalid axis: {0}")]
    InvalidAxis(String),

    /// Source is neither a context nor bound to one
    #[error("The supplied object is not a context and has no bound context")]
    NotAContext,

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_inactive() {
        let err = ContextError::InactiveContext {
            id: 7,
            state: ContextState::Ended,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Context 7"));
        assert!(msg.contains("ended"));
    }

    #[test]
    fn test_error_display_invalid_axis() {
        let err = ContextError::InvalidAxis("sideways".to_string());
        assert_eq!(format!("{}", err), "Invalid axis: sideways");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ContextError = io_err.into();
        assert!(format!("{}", err).contains("missing"));
    }
}
