//! Policy loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SelectionPolicy;

/// Error type for policy loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Load and validate a selection policy from a TOML file.
pub fn load_policy(path: &Path) -> Result<SelectionPolicy, ConfigError> {
    let content = fs::read_to_string(path)?;
    let policy: SelectionPolicy = toml::from_str(&content)?;
    validate_policy(&policy)?;
    Ok(policy)
}

/// Semantic checks serde cannot express.
pub fn validate_policy(policy: &SelectionPolicy) -> Result<(), ConfigError> {
    if policy.fail_threshold == 0 {
        return Err(ConfigError::Validation(
            "fail_threshold must be at least 1".to_string(),
        ));
    }
    Ok(())
}
