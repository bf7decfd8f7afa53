//! Record standardization and content generation.
//!
//! [`standardize_record`] fills the fields a record is missing, required
//! fields first, then optional ones. Each missing field is filled from the
//! schema's declared default when there is one, otherwise from a
//! [`ContentGenerator`]. Filling is additive: a present value is never
//! replaced.
//!
//! The batch loop (store I/O, thresholds, pacing, locking) lives in the
//! application crate; this module only transforms one record at a time.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::duplicates::normalize_name;
use crate::models::{
    value_is_present, CatalogRecord, FIELD_ENHANCED, FIELD_QUALITY_SCORE, FIELD_STANDARDIZED_AT,
    FIELD_UPDATED_AT,
};
use crate::quality::{score_record, RecordScore};
use crate::schema::FieldDefinition;
use crate::schema::FieldSchema;

/// A value produced for a missing field.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub value: Value,
    /// Rich content (images, descriptive text) marks the record `enhanced`.
    pub rich: bool,
}

/// Source of generated field values.
///
/// Returning `Ok(None)` means the generator has nothing for this field; the
/// field stays missing. An `Err` fails the record, not the batch.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        category: &str,
        record: &CatalogRecord,
        field: &FieldDefinition,
    ) -> Result<Option<GeneratedContent>>;
}

/// Deterministic generator for image URLs and descriptions.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    image_base_url: String,
}

impl TemplateGenerator {
    pub fn new(image_base_url: impl Into<String>) -> Self {
        Self {
            image_base_url: image_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/{category}/{slug}-{hash}.jpg`, stable for a category and
    /// normalized name.
    pub fn canonical_image_url(&self, category: &str, name: &str) -> String {
        let key = normalize_name(name);
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", category, key).as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!(
            "{}/{}/{}-{}.jpg",
            self.image_base_url,
            category,
            slugify(&key),
            &digest[..12]
        )
    }

    fn describe(category: &str, record: &CatalogRecord, name: &str) -> String {
        let kind = record
            .get_str("category")
            .filter(|c| *c != "uncategorized")
            .unwrap_or(category);
        let source = record.source().unwrap_or("reference datasets");
        format!(
            "{} is a {} listed in the catalog. Its details are compiled from {}.",
            name, kind, source
        )
    }
}

fn slugify(key: &str) -> String {
    let mut slug = String::with_capacity(key.len());
    for c in key.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(
        &self,
        category: &str,
        record: &CatalogRecord,
        field: &FieldDefinition,
    ) -> Result<Option<GeneratedContent>> {
        let Some(name) = record.name() else {
            return Ok(None);
        };
        let content = match field.name.as_str() {
            "image_url" => Some(self.canonical_image_url(category, name)),
            "description" => Some(Self::describe(category, record, name)),
            _ => None,
        };
        Ok(content.map(|text| GeneratedContent {
            value: Value::String(text),
            rich: true,
        }))
    }
}

/// A standardized record and what changed.
#[derive(Debug, Clone)]
pub struct StandardizeOutcome {
    pub record: CatalogRecord,
    pub filled_fields: Vec<String>,
    pub enhanced: bool,
    pub before: RecordScore,
    pub after: RecordScore,
}

/// Per-record line of a [`StandardizationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub id: String,
    pub name: String,
    pub completeness_before: u8,
    pub completeness_after: u8,
    pub data_quality_after: u8,
    pub filled_fields: Vec<String>,
    pub enhanced: bool,
}

impl ProcessedRecord {
    pub fn from_outcome(outcome: &StandardizeOutcome) -> Self {
        Self {
            id: outcome.record.id().unwrap_or_default().to_string(),
            name: outcome.record.name().unwrap_or_default().to_string(),
            completeness_before: outcome.before.completeness,
            completeness_after: outcome.after.completeness,
            data_quality_after: outcome.after.data_quality,
            filled_fields: outcome.filled_fields.clone(),
            enhanced: outcome.enhanced,
        }
    }
}

/// Result of a standardization run over one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizationResult {
    /// Records that were patched (and persisted, unless `dry_run`).
    pub standardized: usize,
    /// Subset of `standardized` that received rich content.
    pub enhanced: usize,
    /// Valid records examined.
    pub total: usize,
    pub errors: Vec<String>,
    pub processed_records: Vec<ProcessedRecord>,
    pub dry_run: bool,
}

/// Fill the missing fields of `record`.
///
/// Returns `Ok(None)` when no field could be filled; the record is then
/// left as it is and must not be rewritten. Otherwise the patched record is
/// re-scored and stamped with `quality_score`, `standardized_at`,
/// `updated_at` and `enhanced`.
pub async fn standardize_record(
    record: &CatalogRecord,
    schema: &FieldSchema,
    generator: &dyn ContentGenerator,
    now: DateTime<Utc>,
) -> Result<Option<StandardizeOutcome>> {
    let before = score_record(record, schema);
    let mut patched = record.clone();
    let mut filled_fields = Vec::new();
    let mut enhanced = false;

    let ordered = schema
        .fields()
        .iter()
        .filter(|f| f.required)
        .chain(schema.fields().iter().filter(|f| !f.required));

    for field in ordered {
        if patched.is_present(&field.name) {
            continue;
        }
        if let Some(default) = field.default.as_ref().filter(|v| value_is_present(v)) {
            patched.set(field.name.clone(), default.clone());
            filled_fields.push(field.name.clone());
            continue;
        }
        if let Some(content) = generator
            .generate(schema.category(), &patched, field)
            .await?
        {
            if value_is_present(&content.value) {
                patched.set(field.name.clone(), content.value);
                filled_fields.push(field.name.clone());
                enhanced |= content.rich;
            }
        }
    }

    if filled_fields.is_empty() {
        return Ok(None);
    }

    let after = score_record(&patched, schema);
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    patched.set(FIELD_QUALITY_SCORE, json!(after.data_quality));
    patched.set(FIELD_STANDARDIZED_AT, json!(stamp));
    patched.set(FIELD_UPDATED_AT, json!(stamp));
    if enhanced || patched.get(FIELD_ENHANCED).is_none() {
        patched.set(FIELD_ENHANCED, json!(enhanced));
    }

    Ok(Some(StandardizeOutcome {
        record: patched,
        filled_fields,
        enhanced,
        before,
        after,
    }))
}
