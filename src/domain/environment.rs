use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Best-effort description of the device and runtime an event was captured on.
///
/// The engine never interprets the contents; whatever the environment
/// provider reports is carried through to the delivery payload as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSnapshot {
    fields: Map<String, Value>,
}

impl EnvironmentSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for EnvironmentSnapshot {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
