//! Lock configuration, loadable from JSON.
//!
//! ```
//! use global_lock::LockConfig;
//!
//! let config = LockConfig::from_json(r#"{ "root": "/locks/orders", "owner": "worker-1" }"#).unwrap();
//! assert_eq!(config.root, "/locks/orders");
//! assert_eq!(config.node_prefix, "lock-");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordination::validate_path;

/// Prefix of candidate node names when none is configured.
pub const DEFAULT_NODE_PREFIX: &str = "lock-";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Path of the pre-existing node whose children form the wait queue.
    pub root: String,
    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,
    /// Label written into candidate nodes. Defaults to `pid-<process id>`.
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_node_prefix() -> String {
    DEFAULT_NODE_PREFIX.to_string()
}

impl LockConfig {
    pub fn new(root: impl Into<String>) -> Self {
        LockConfig {
            root: root.into(),
            node_prefix: default_node_prefix(),
            owner: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.node_prefix = prefix.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: LockConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path(&self.root).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.root == "/" {
            return Err(ConfigError::Invalid(
                "lock root must not be the namespace root".to_string(),
            ));
        }
        if self.node_prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "node prefix {:?} must not contain '/'",
                self.node_prefix
            )));
        }
        // A trailing digit would run into the sequence suffix.
        if self
            .node_prefix
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "node prefix {:?} must not end in a digit",
                self.node_prefix
            )));
        }
        if matches!(&self.owner, Some(owner) if owner.is_empty()) {
            return Err(ConfigError::Invalid("owner must not be empty".to_string()));
        }
        Ok(())
    }
}
