//! Catalog record model.
//!
//! A [`CatalogRecord`] is a flat JSON object describing one catalog entity
//! (a nutrient, ingredient, pollutant, or product). Records are schemaless at
//! rest: the field schema only describes what is *expected*, and unknown
//! fields are carried through every operation untouched.
//!
//! # Presence
//!
//! A field is **present** when its value carries information:
//!
//! | JSON type | Present when |
//! |-----------|--------------|
//! | `null` | never |
//! | string | non-empty after trimming |
//! | array | at least one element |
//! | object | at least one key |
//! | number / bool | always |
//!
//! The same rule drives completeness scoring, standardization, and merging,
//! so "missing" means the same thing everywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Record identifier field.
pub const FIELD_ID: &str = "id";
/// Display name field.
pub const FIELD_NAME: &str = "name";
/// Provenance field.
pub const FIELD_SOURCE: &str = "source";
/// Creation timestamp (RFC 3339).
pub const FIELD_CREATED_AT: &str = "created_at";
/// Last modification timestamp (RFC 3339).
pub const FIELD_UPDATED_AT: &str = "updated_at";
/// Data quality score written by the engine after standardization or merge.
pub const FIELD_QUALITY_SCORE: &str = "quality_score";
/// Timestamp of the last standardization pass that touched the record.
pub const FIELD_STANDARDIZED_AT: &str = "standardized_at";
/// Set once generated rich content has been added.
pub const FIELD_ENHANCED: &str = "enhanced";
/// Manually verified by an administrator.
pub const FIELD_VERIFIED: &str = "verified";
/// Ids of records absorbed into this one by merges.
pub const FIELD_MERGED_IDS: &str = "merged_ids";
/// Timestamp of the last merge into this record.
pub const FIELD_MERGED_AT: &str = "merged_at";

/// Problems that make a record unusable for scoring or mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no id")]
    MissingId,
    #[error("record {id} has no name")]
    MissingName { id: String },
}

/// One catalog entity as stored in the record store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRecord(Map<String, Value>);

impl CatalogRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(RecordError::NotAnObject),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Trimmed, non-empty string value of `field`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str(FIELD_ID)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(FIELD_NAME)
    }

    pub fn source(&self) -> Option<&str> {
        self.get_str(FIELD_SOURCE)
    }

    /// Parsed `created_at`, if present and valid RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get_str(FIELD_CREATED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_verified(&self) -> bool {
        self.0
            .get(FIELD_VERIFIED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_present(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(value_is_present)
    }

    /// Check the identity fields every engine operation relies on.
    pub fn validate(&self) -> Result<(), RecordError> {
        let id = self.id().ok_or(RecordError::MissingId)?;
        if self.name().is_none() {
            return Err(RecordError::MissingName { id: id.to_string() });
        }
        Ok(())
    }
}

/// Whether a JSON value counts as a present field value.
pub fn value_is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Store key for a record of `category` with the given id.
pub fn record_key(category: &str, id: &str) -> String {
    format!("{}{}", category_prefix(category), id)
}

/// Key prefix shared by every record of `category`.
pub fn category_prefix(category: &str) -> String {
    format!("{}:", category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> CatalogRecord {
        CatalogRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_presence_rules() {
        assert!(!value_is_present(&Value::Null));
        assert!(!value_is_present(&json!("   ")));
        assert!(!value_is_present(&json!([])));
        assert!(!value_is_present(&json!({})));
        assert!(value_is_present(&json!("mg")));
        assert!(value_is_present(&json!(0)));
        assert!(value_is_present(&json!(false)));
        assert!(value_is_present(&json!(["USDA"])));
        assert!(value_is_present(&json!({"protein": 1.2})));
    }

    #[test]
    fn test_validate_requires_id_and_name() {
        assert_eq!(
            record(json!({"name": "Zinc"})).validate(),
            Err(RecordError::MissingId)
        );
        assert_eq!(
            record(json!({"id": "n1", "name": "  "})).validate(),
            Err(RecordError::MissingName {
                id: "n1".to_string()
            })
        );
        assert!(record(json!({"id": "n1", "name": "Zinc"})).validate().is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(
            CatalogRecord::from_value(json!(["n1"])),
            Err(RecordError::NotAnObject)
        );
    }

    #[test]
    fn test_created_at_parsing() {
        let r = record(json!({"created_at": "2024-03-01T10:00:00+02:00"}));
        assert_eq!(
            r.created_at().unwrap().to_rfc3339(),
            "2024-03-01T08:00:00+00:00"
        );
        assert!(record(json!({"created_at": "yesterday"})).created_at().is_none());
    }

    #[test]
    fn test_record_key_uses_category_prefix() {
        assert_eq!(record_key("nutrient", "n1"), "nutrient:n1");
        assert!(record_key("nutrient", "n1").starts_with(&category_prefix("nutrient")));
    }
}
