//! Tracing subscriber bootstrap.

use crate::config::ContextConfig;
use crate::error::{ContextError, Result};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, or by
/// `config.log_level` when the variable is unset.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &ContextConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ContextError::Logging(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| ContextError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_only_once() {
        let config = ContextConfig::default();
        // Another subscriber may already be installed in this process.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(ContextError::Logging(_))
        ));
    }
}
