use crate::error::ModelResult;
use serde::{Deserialize, Serialize};

/// Construction-time settings for a [`Container`](crate::Container).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Label attached to log events and channel names.
    pub name: String,
    /// Prune unobserved subscription nodes after every update and restore.
    pub auto_prune: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            auto_prune: false,
        }
    }
}

impl ContainerConfig {
    /// Load from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_auto_prune(mut self, enabled: bool) -> Self {
        self.auto_prune = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.name, "model");
        assert!(!config.auto_prune);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = ContainerConfig::from_json(r#"{"auto_prune": true}"#).unwrap();
        assert_eq!(config.name, "model");
        assert!(config.auto_prune);

        let config = ContainerConfig::from_json("{}").unwrap();
        assert_eq!(config, ContainerConfig::default());
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(ContainerConfig::from_json(r#"{"auto_prune": "yes"}"#).is_err());
    }

    #[test]
    fn test_builders() {
        let config = ContainerConfig::default()
            .with_name("todos")
            .with_auto_prune(true);
        assert_eq!(config.name, "todos");
        assert!(config.auto_prune);
    }
}
