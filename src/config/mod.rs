//! Configuration surface for pipeline composition.
//!
//! A [`Configuration`] is a keyed bag: default name pieces applied to bare
//! declarations, opaque per-node parameter tables, and the output items
//! handed to the persistence layer. Parsing configuration files is out of
//! scope; callers construct these values directly or deserialize them with
//! serde.

use serde::{Deserialize, Serialize};

use crate::model::AlgorithmName;

/// Configuration validation utilities
pub mod validation;

pub use validation::{Validatable, ValidationResult};

/// One product selected for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Product name to persist
    pub product: String,
    /// Payload type name agreed with the backend
    #[serde(default)]
    pub type_name: String,
}

/// Keyed configuration bag consumed during composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Default plugin name applied to declarations that omit one
    #[serde(default)]
    pub plugin: Option<String>,

    /// Default algorithm name applied to declarations that omit one
    #[serde(default)]
    pub algorithm: Option<String>,

    /// Per-node parameters, opaque to the core
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    /// Products the persistence layer should receive
    #[serde(default)]
    pub output_items: Vec<OutputItem>,
}

impl Configuration {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration carrying only a default plugin name.
    pub fn with_plugin(plugin: impl Into<String>) -> Self {
        Self {
            plugin: Some(plugin.into()),
            ..Self::default()
        }
    }

    /// Resolve a declared name against the configured defaults.
    pub fn resolve_name(&self, declared: &str) -> AlgorithmName {
        let mut name = AlgorithmName::parse(declared);
        if name.plugin().is_none() {
            if let Some(plugin) = &self.plugin {
                name = AlgorithmName::qualified(
                    plugin.clone(),
                    name.algorithm().unwrap_or_default().to_string(),
                );
            }
        }
        name
    }

    /// The opaque parameter table for a node, if configured.
    pub fn parameters_for(&self, node: &str) -> Option<&serde_json::Value> {
        self.parameters.get(node)
    }
}

impl Validatable for Configuration {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(plugin) = &self.plugin {
            if plugin.contains(':') {
                result.error(format!("default plugin name '{plugin}' contains ':'"));
            }
        }
        for item in &self.output_items {
            if item.product.is_empty() {
                result.error("output item with empty product name".to_string());
            }
        }
        result
    }
}
