//! Bulk record import from JSON files.
//!
//! Loads a JSON array of record objects into the store under
//! `{category}:{id}`. Existing records with the same id are replaced.
//! Entries without a string `id` are skipped with a warning. Used by
//! `steward import`.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::path::Path;
use tracing::warn;

use catalog_steward_core::models::{record_key, CatalogRecord};
use catalog_steward_core::store::RecordStore;

use crate::engine::validate_category;

/// Field stamped on records that do not carry one yet.
pub const FIELD_IMPORTED_AT: &str = "imported_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Write `values` into `category`.
pub async fn import_records(
    store: &dyn RecordStore,
    category: &str,
    values: Vec<Value>,
) -> Result<ImportSummary> {
    validate_category(category)?;
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut summary = ImportSummary::default();

    for (index, value) in values.into_iter().enumerate() {
        let mut record = match CatalogRecord::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(category = %category, index, error = %e, "skipping import entry");
                summary.skipped += 1;
                continue;
            }
        };
        let Some(id) = record.id().map(str::to_string) else {
            warn!(category = %category, index, "skipping import entry without id");
            summary.skipped += 1;
            continue;
        };
        if record.get(FIELD_IMPORTED_AT).is_none() {
            record.set(FIELD_IMPORTED_AT, json!(stamp));
        }

        store
            .set(&record_key(category, &id), &record.into_value())
            .await
            .with_context(|| format!("failed to write record {}", id))?;
        summary.imported += 1;
    }

    Ok(summary)
}

/// Read a JSON array of records from `path`.
pub fn read_records_file(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))?;
    match parsed {
        Value::Array(items) => Ok(items),
        _ => anyhow::bail!("import file must contain a JSON array of records"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_steward_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_import_skips_entries_without_id() {
        let store = InMemoryStore::new();
        let values = vec![
            json!({"id": "n1", "name": "Zinc"}),
            json!({"name": "No id"}),
            json!("not an object"),
            json!({"id": "n2", "name": "Iron", "imported_at": "2024-01-01T00:00:00Z"}),
        ];

        let summary = import_records(&store, "nutrient", values).await.unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 2 });

        let n1 = store.get("nutrient:n1").await.unwrap().unwrap();
        assert!(n1["imported_at"].is_string());
        let n2 = store.get("nutrient:n2").await.unwrap().unwrap();
        assert_eq!(n2["imported_at"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_import_rejects_bad_category() {
        let store = InMemoryStore::new();
        assert!(import_records(&store, "Bad:Cat", vec![]).await.is_err());
    }
}
