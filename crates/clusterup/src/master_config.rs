//! Master configuration codec.
//!
//! Only `routingConfig.subdomain` is interpreted. The rest of the document
//! is carried as an untyped YAML tree so re-serializing preserves every
//! other field and its order.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{MasterConfigError, StartupError, StartupResult};

const ROUTING_CONFIG: &str = "routingConfig";
const SUBDOMAIN: &str = "subdomain";

/// Parsed `master-config.yaml`.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterConfig {
    doc: Mapping,
}

impl MasterConfig {
    /// Parses a YAML document whose root must be a mapping.
    pub fn from_yaml(text: &str) -> Result<Self, MasterConfigError> {
        match serde_yaml::from_str::<Value>(text).map_err(MasterConfigError::Parse)? {
            Value::Mapping(doc) => Ok(Self { doc }),
            Value::Null => Ok(Self { doc: Mapping::new() }),
            other => Err(MasterConfigError::NotMapping {
                found: kind_of(&other),
            }),
        }
    }

    pub async fn load(path: &Path) -> StartupResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StartupError::config_update(path, format!("read failed: {}", e)))?;
        Self::from_yaml(&text).map_err(|e| StartupError::config_update(path, format!("parse failed: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, MasterConfigError> {
        serde_yaml::to_string(&self.doc).map_err(MasterConfigError::Serialize)
    }

    pub async fn save(&self, path: &Path) -> StartupResult<()> {
        let text = self
            .to_yaml()
            .map_err(|e| StartupError::config_update(path, format!("serialize failed: {}", e)))?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| StartupError::config_update(path, format!("write failed: {}", e)))
    }

    pub fn routing_subdomain(&self) -> Option<&str> {
        self.doc
            .get(ROUTING_CONFIG)
            .and_then(|routing| routing.get(SUBDOMAIN))
            .and_then(Value::as_str)
    }

    /// Sets `routingConfig.subdomain`, creating `routingConfig` when absent
    /// or replacing it when it is not a mapping.
    pub fn set_routing_subdomain(&mut self, subdomain: &str) {
        let key = Value::String(ROUTING_CONFIG.to_string());
        let routing = self
            .doc
            .entry(key)
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !routing.is_mapping() {
            *routing = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(routing) = routing {
            routing.insert(
                Value::String(SUBDOMAIN.to_string()),
                Value::String(subdomain.to_string()),
            );
        }
    }

    /// Value of a top-level field, for inspection.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
