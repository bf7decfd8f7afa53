//! Completeness and data-quality scoring.
//!
//! # Scores
//!
//! For a schema with `R` required and `O` optional fields, and a record with
//! `r` required and `o` optional fields present:
//!
//! ```text
//! completeness = round(100 × (r + o) / (R + O))
//! dataQuality  = round(100 × (2r + o) / (2R + O))
//! ```
//!
//! Both scores lie in `[0, 100]` and are non-decreasing as fields become
//! present. Because a required field weighs twice as much as an optional
//! one in `dataQuality`, a record missing required fields always scores
//! below an equally complete record missing only optional fields.
//!
//! An empty schema scores every record 0 and flags nothing for
//! standardization.

use serde::Serialize;

use crate::duplicates::{find_duplicates, DuplicateGroup};
use crate::models::{CatalogRecord, RecordError};
use crate::schema::FieldSchema;

/// Weight of a required field in `dataQuality`.
pub const REQUIRED_WEIGHT: usize = 2;
/// Weight of an optional field in `dataQuality`.
pub const OPTIONAL_WEIGHT: usize = 1;
/// Completeness below which a record needs standardization.
pub const DEFAULT_THRESHOLD: u8 = 90;

/// Field-level scoring of a single record against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordScore {
    pub completeness: u8,
    pub data_quality: u8,
    /// Required fields that are not present.
    pub missing_fields: Vec<String>,
    /// Optional fields that are not present.
    pub empty_fields: Vec<String>,
    pub present_fields: usize,
    pub total_expected: usize,
}

impl RecordScore {
    pub fn needs_standardization(&self, threshold: u8) -> bool {
        self.total_expected > 0 && self.completeness < threshold
    }
}

/// Per-record line of a quality report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAnalysisItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub completeness: u8,
    pub data_quality: u8,
    pub missing_fields: Vec<String>,
    pub empty_fields: Vec<String>,
    pub present_fields: usize,
    pub total_expected: usize,
}

/// Aggregate view of a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub total_nutrients: usize,
    pub average_completeness: f64,
    pub average_data_quality: f64,
    pub duplicate_groups: usize,
    /// Records a full merge would remove: Σ (count − 1).
    pub total_duplicates: usize,
    pub needs_standardization: usize,
    pub invalid_records: usize,
    pub threshold: u8,
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub summary: QualitySummary,
    pub items: Vec<QualityAnalysisItem>,
    pub duplicates: Vec<DuplicateGroup>,
    pub needs_standardization: Vec<QualityAnalysisItem>,
    /// Records excluded from scoring, for the caller to log.
    #[serde(skip)]
    pub invalid: Vec<RecordError>,
}

fn percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round().min(100.0) as u8
}

/// Score one record against `schema`.
pub fn score_record(record: &CatalogRecord, schema: &FieldSchema) -> RecordScore {
    let mut present = 0;
    let mut weighted_present = 0;
    let mut weighted_total = 0;
    let mut missing_fields = Vec::new();
    let mut empty_fields = Vec::new();

    for field in schema.fields() {
        let weight = if field.required {
            REQUIRED_WEIGHT
        } else {
            OPTIONAL_WEIGHT
        };
        weighted_total += weight;
        if record.is_present(&field.name) {
            present += 1;
            weighted_present += weight;
        } else if field.required {
            missing_fields.push(field.name.clone());
        } else {
            empty_fields.push(field.name.clone());
        }
    }

    RecordScore {
        completeness: percent(present, schema.len()),
        data_quality: percent(weighted_present, weighted_total),
        missing_fields,
        empty_fields,
        present_fields: present,
        total_expected: schema.len(),
    }
}

fn to_item(record: &CatalogRecord, schema: &FieldSchema, score: RecordScore) -> QualityAnalysisItem {
    QualityAnalysisItem {
        id: record.id().unwrap_or_default().to_string(),
        name: record.name().unwrap_or_default().to_string(),
        category: record
            .get_str("category")
            .unwrap_or(schema.category())
            .to_string(),
        completeness: score.completeness,
        data_quality: score.data_quality,
        missing_fields: score.missing_fields,
        empty_fields: score.empty_fields,
        present_fields: score.present_fields,
        total_expected: score.total_expected,
    }
}

fn mean(values: impl Iterator<Item = u8>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = values.map(f64::from).sum();
    (sum / count as f64 * 10.0).round() / 10.0
}

/// Score every valid record, find duplicate groups, and summarize.
///
/// Pure and deterministic: the same records in the same order always yield
/// the same report.
pub fn analyze(records: &[CatalogRecord], schema: &FieldSchema, threshold: u8) -> QualityReport {
    let mut invalid = Vec::new();
    let mut valid: Vec<CatalogRecord> = Vec::with_capacity(records.len());
    for record in records {
        match record.validate() {
            Ok(()) => valid.push(record.clone()),
            Err(e) => invalid.push(e),
        }
    }

    let items: Vec<QualityAnalysisItem> = valid
        .iter()
        .map(|r| to_item(r, schema, score_record(r, schema)))
        .collect();

    let needs_standardization: Vec<QualityAnalysisItem> = if schema.is_empty() {
        Vec::new()
    } else {
        items
            .iter()
            .filter(|item| item.completeness < threshold)
            .cloned()
            .collect()
    };

    let duplicates = find_duplicates(&valid, schema.category());
    let total_duplicates = duplicates.iter().map(|g| g.count - 1).sum();

    let summary = QualitySummary {
        total_nutrients: items.len(),
        average_completeness: mean(items.iter().map(|i| i.completeness), items.len()),
        average_data_quality: mean(items.iter().map(|i| i.data_quality), items.len()),
        duplicate_groups: duplicates.len(),
        total_duplicates,
        needs_standardization: needs_standardization.len(),
        invalid_records: invalid.len(),
        threshold,
    };

    QualityReport {
        summary,
        items,
        duplicates,
        needs_standardization,
        invalid,
    }
}
