use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum AttributeError {
    #[error("attribute value could not be converted: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("attribute '{0}' is not a nested map")]
    NotAMap(String),
    #[error("missing required attribute '{0}'")]
    Missing(String),
}

/// A single entry of a [`NestedAttributes`] map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Map(NestedAttributes),
    Value(Value),
}

/// Nested key/value attributes carried by components and assets.
///
/// Top level keys are namespaces: one per format (`maven2`, `raw`, ...)
/// plus `checksum`. Scalar leaves are indexed by the metadata store under
/// their dotted path, e.g. `attributes.maven2.key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedAttributes(BTreeMap<String, AttributeValue>);

impl NestedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Typed read of a value. Returns `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AttributeError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttributeValue::Value(value)) => Ok(Some(serde_json::from_value(value.clone())?)),
            Some(AttributeValue::Map(map)) => {
                Ok(Some(serde_json::from_value(serde_json::to_value(map)?)?))
            }
        }
    }

    /// Like [`NestedAttributes::get`], but a missing key is an error.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, AttributeError> {
        self.get(key)?
            .ok_or_else(|| AttributeError::Missing(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttributeValue::Value(Value::String(s))) => Some(s),
            _ => None,
        }
    }

    /// Set a value; `None`-like values (JSON null) remove the key instead.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), AttributeError> {
        let value = serde_json::to_value(value)?;
        if value.is_null() {
            self.0.remove(key);
            return Ok(());
        }
        let entry = match value {
            Value::Object(_) => AttributeValue::Map(serde_json::from_value(value)?),
            other => AttributeValue::Value(other),
        };
        self.0.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.remove(key)
    }

    /// Copy of the nested map under `key`, empty if absent.
    pub fn child(&self, key: &str) -> NestedAttributes {
        match self.0.get(key) {
            Some(AttributeValue::Map(map)) => map.clone(),
            _ => NestedAttributes::default(),
        }
    }

    /// Mutable access to the nested map under `key`, created if absent.
    pub fn child_mut(&mut self, key: &str) -> Result<&mut NestedAttributes, AttributeError> {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| AttributeValue::Map(NestedAttributes::default()));
        match entry {
            AttributeValue::Map(map) => Ok(map),
            AttributeValue::Value(_) => Err(AttributeError::NotAMap(key.to_string())),
        }
    }

    /// Merge `other` into this map; nested maps merge recursively, other values overwrite.
    pub fn merge(&mut self, other: NestedAttributes) {
        for (key, value) in other.0 {
            match (self.0.get_mut(&key), value) {
                (Some(AttributeValue::Map(existing)), AttributeValue::Map(incoming)) => {
                    existing.merge(incoming)
                }
                (_, value) => {
                    self.0.insert(key, value);
                }
            }
        }
    }

    /// String leaf at a dotted path such as `remote.sha1`.
    pub fn get_path(&self, path: &str) -> Option<String> {
        match path.split_once('.') {
            None => self.get_str(path).map(str::to_string),
            Some((head, rest)) => match self.0.get(head) {
                Some(AttributeValue::Map(map)) => map.get_path(rest),
                _ => None,
            },
        }
    }

    /// Set a leaf at a dotted path, creating intermediate maps.
    pub fn set_path<T: Serialize>(&mut self, path: &str, value: T) -> Result<(), AttributeError> {
        match path.split_once('.') {
            None => self.set(path, value),
            Some((head, rest)) => self.child_mut(head)?.set_path(rest, value),
        }
    }

    /// Remove the leaf at a dotted path. Emptied parent maps are kept.
    pub fn remove_path(&mut self, path: &str) -> Option<AttributeValue> {
        match path.split_once('.') {
            None => self.0.remove(path),
            Some((head, rest)) => match self.0.get_mut(head) {
                Some(AttributeValue::Map(map)) => map.remove_path(rest),
                _ => None,
            },
        }
    }

    /// Scalar leaves as `(dotted.path, value)` pairs, prefixed with `prefix`.
    ///
    /// Strings are returned verbatim, numbers and booleans in JSON form;
    /// nulls and arrays are not indexable and are skipped.
    pub fn flatten(&self, prefix: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.flatten_into(prefix, &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for (key, value) in &self.0 {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                AttributeValue::Map(map) => map.flatten_into(&path, out),
                AttributeValue::Value(value) => {
                    if let Some(indexed) = index_value(value) {
                        out.push((path, indexed));
                    }
                }
            }
        }
    }
}

/// String form of a scalar as stored in property indexes.
pub(crate) fn index_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
