//! Rule file loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl RuleConfig {
    /// Load a rule file from YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a rule file from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RuleConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the rule file structure.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA256 fingerprint of the rule file, identifying one rule model
    /// generation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The data source unsharded tables go to.
    pub fn resolved_default_data_source(&self) -> Option<&str> {
        match (&self.default_data_source, self.data_sources.as_slice()) {
            (Some(ds), _) => Some(ds.as_str()),
            (None, [only]) => Some(only.as_str()),
            _ => None,
        }
    }
}
