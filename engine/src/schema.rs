//! Model schema: identity and declared fields.
//!
//! A schema tells a store which fields make up a record's key, which fields
//! it keeps at all, and what defaults a new record starts with.

use crate::{error::Result, Error, Fields, RecordKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator placed between the values of a composite key.
pub const KEY_SEPARATOR: &str = "/";

/// Schema for one model (one store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSchema {
    /// Model name, used in logs and notifications
    pub name: String,
    /// Ordered key fields
    pub key: Vec<String>,
    /// Declared fields. Empty means "keep every field".
    pub fields: Vec<String>,
    /// Values applied to absent fields of new records
    pub defaults: Fields,
}

impl ModelSchema {
    /// Create a schema keyed by `id` that keeps every field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: vec!["id".to_string()],
            fields: Vec::new(),
            defaults: Fields::new(),
        }
    }

    /// Use a single key field.
    pub fn with_key(mut self, field: impl Into<String>) -> Self {
        self.key = vec![field.into()];
        self
    }

    /// Use a composite key made of several fields, in order.
    pub fn with_composite_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the fields a record keeps.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a default value.
    pub fn with_default(mut self, field: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(field.into(), value);
        self
    }

    /// Check the schema is usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema("model name is empty".into()));
        }
        if self.key.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "model {} has no key fields",
                self.name
            )));
        }
        for field in self.key.iter().chain(self.defaults.keys()) {
            if !self.declares(field) {
                return Err(Error::InvalidSchema(format!(
                    "field '{}' of model {} is not declared",
                    field, self.name
                )));
            }
        }
        Ok(())
    }

    /// Whether the schema keeps `field`.
    pub fn declares(&self, field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == field)
    }

    /// Whether `field` is part of the key.
    pub fn is_key_field(&self, field: &str) -> bool {
        self.key.iter().any(|f| f == field)
    }

    /// Whether the key spans more than one field.
    pub fn is_composite(&self) -> bool {
        self.key.len() > 1
    }

    /// Keep only declared fields.
    pub fn project(&self, data: &Fields) -> Fields {
        data.iter()
            .filter(|(name, _)| self.declares(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Project `fields`, fill in defaults, and generate a missing key.
    pub fn prepare(&self, fields: &Fields) -> Result<Fields> {
        let mut prepared = self.project(fields);
        for (name, value) in &self.defaults {
            prepared.entry(name.clone()).or_insert_with(|| value.clone());
        }
        self.ensure_key(&mut prepared);
        Ok(prepared)
    }

    /// Generate a UUID for a single absent key field.
    ///
    /// Composite keys cannot be generated and must be supplied.
    pub fn ensure_key(&self, fields: &mut Fields) {
        if self.is_composite() {
            return;
        }
        let field = &self.key[0];
        let missing = fields.get(field).map_or(true, Value::is_null);
        if missing {
            fields.insert(
                field.clone(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
    }

    /// Build the identity key from the key fields.
    pub fn build_key(&self, fields: &Fields) -> Result<RecordKey> {
        let mut parts = Vec::with_capacity(self.key.len());
        for field in &self.key {
            let part = match fields.get(field) {
                None | Some(Value::Null) => {
                    return Err(Error::MissingKeyField {
                        model: self.name.clone(),
                        field: field.clone(),
                    })
                }
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            parts.push(part);
        }
        Ok(RecordKey::new(parts.join(KEY_SEPARATOR)))
    }

    /// Clear the key fields.
    pub fn remove_key(&self, fields: &mut Fields) {
        for field in &self.key {
            fields.remove(field);
        }
    }

    /// Reject fields the schema does not declare.
    pub fn check_field(&self, field: &str) -> Result<()> {
        if self.declares(field) {
            Ok(())
        } else {
            Err(Error::UnknownField {
                model: self.name.clone(),
                field: field.to_string(),
            })
        }
    }
}
