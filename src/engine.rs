//! The catalog engine service.
//!
//! [`CatalogEngine`] owns a record store, the field registry, a content
//! generator and the engine settings, and exposes the three admin
//! operations:
//!
//! | Operation | Mutates | Lock |
//! |-----------|---------|------|
//! | [`analyze`](CatalogEngine::analyze) | no | none |
//! | [`standardize`](CatalogEngine::standardize) | records below threshold | category lock |
//! | [`merge_duplicates`](CatalogEngine::merge_duplicates) | duplicate groups | category lock |
//!
//! Scoring, grouping, filling and merge planning are the pure functions of
//! `catalog_steward_core`; this module adds store I/O, chunked pacing,
//! locking and per-record error collection. Dry runs compute the same
//! result without writing and take no lock.
//!
//! Per-record failures land in the result's `errors` list and never abort
//! the run. Category-level failures (bad or unknown category, busy lock,
//! failed category scan) are returned as [`EngineError`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use catalog_steward_core::duplicates::{cluster_by_name, DuplicateGroup};
use catalog_steward_core::merge::{plan_merge, MergeAudit, MergeCandidate, MergeResult};
use catalog_steward_core::models::{category_prefix, record_key, CatalogRecord};
use catalog_steward_core::quality::{self, score_record, QualityAnalysisItem, QualitySummary};
use catalog_steward_core::schema::{FieldRegistry, FieldSchema};
use catalog_steward_core::standardize::{
    standardize_record, ContentGenerator, ProcessedRecord, StandardizationResult,
    TemplateGenerator,
};
use catalog_steward_core::store::memory::InMemoryStore;
use catalog_steward_core::store::RecordStore;

use crate::auth::AdminIdentity;
use crate::config::{Config, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::lock::CategoryLock;

const MAX_CATEGORY_LEN: usize = 64;

/// Tunables for a [`CatalogEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub threshold: u8,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub lock_ttl: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            threshold: config.threshold,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
            lock_ttl: config.lock_ttl(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Response of [`CatalogEngine::analyze`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub summary: QualitySummary,
    pub quality_analysis: Vec<QualityAnalysisItem>,
    pub duplicates: Vec<DuplicateGroup>,
    pub needs_standardization: Vec<QualityAnalysisItem>,
    pub expected_fields: Vec<String>,
}

/// Check that `category` is usable as a key namespace: 1 to 64 characters
/// from `[a-z0-9_-]`.
pub fn validate_category(category: &str) -> EngineResult<()> {
    let valid = !category.is_empty()
        && category.len() <= MAX_CATEGORY_LEN
        && category
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidCategory(category.to_string()))
    }
}

pub struct CatalogEngine {
    store: Arc<dyn RecordStore>,
    registry: FieldRegistry,
    generator: Arc<dyn ContentGenerator>,
    settings: EngineSettings,
}

impl CatalogEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: FieldRegistry,
        generator: Arc<dyn ContentGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            generator,
            settings,
        }
    }

    /// Engine over `store` with the built-in registry and the template
    /// content generator.
    pub fn from_config(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Self::new(
            store,
            FieldRegistry::builtin(),
            Arc::new(TemplateGenerator::new(config.content.image_base_url.clone())),
            EngineSettings::from_config(&config.engine),
        )
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Expected schema of `category`; empty when the category is unknown.
    pub fn field_definitions(&self, category: &str) -> FieldSchema {
        self.registry.field_definitions(category)
    }

    pub async fn get_record(&self, category: &str, id: &str) -> EngineResult<Option<CatalogRecord>> {
        validate_category(category)?;
        let value = self
            .store
            .get(&record_key(category, id))
            .await
            .map_err(EngineError::Store)?;
        Ok(value.and_then(|v| CatalogRecord::from_value(v).ok()))
    }

    /// Score every record of `category`, group duplicates and summarize.
    ///
    /// An unknown category is analyzed against an empty schema rather than
    /// rejected.
    pub async fn analyze(
        &self,
        admin: &AdminIdentity,
        category: &str,
    ) -> EngineResult<AnalysisResponse> {
        validate_category(category)?;
        let schema = self.registry.field_definitions(category);
        if schema.is_empty() {
            warn!(category = %category, "no field schema for category, analyzing against empty schema");
        }

        let records = self.load_records(category).await?;
        let report = quality::analyze(&records, &schema, self.settings.threshold);
        for problem in &report.invalid {
            warn!(category = %category, error = %problem, "record excluded from analysis");
        }

        info!(
            admin = %admin.email(),
            category = %category,
            records = report.summary.total_nutrients,
            duplicate_groups = report.summary.duplicate_groups,
            needs_standardization = report.summary.needs_standardization,
            "analysis complete"
        );

        Ok(AnalysisResponse {
            summary: report.summary,
            quality_analysis: report.items,
            duplicates: report.duplicates,
            needs_standardization: report.needs_standardization,
            expected_fields: schema.field_names(),
        })
    }

    /// Fill the missing fields of every record below the threshold.
    pub async fn standardize(
        &self,
        admin: &AdminIdentity,
        category: &str,
        dry_run: bool,
    ) -> EngineResult<StandardizationResult> {
        let schema = self.require_schema(category)?;
        info!(admin = %admin.email(), category = %category, dry_run, "standardize started");

        let lock = self.lock_unless_dry_run(category, "standardize", dry_run).await?;
        let result = self.run_standardize(category, schema, dry_run).await;
        self.release(lock).await;

        if let Ok(r) = &result {
            info!(
                category = %category,
                standardized = r.standardized,
                enhanced = r.enhanced,
                total = r.total,
                errors = r.errors.len(),
                dry_run,
                "standardize finished"
            );
        }
        result
    }

    /// Merge every duplicate group of `category` into its primary record.
    pub async fn merge_duplicates(
        &self,
        admin: &AdminIdentity,
        category: &str,
        dry_run: bool,
    ) -> EngineResult<MergeResult> {
        let schema = self.require_schema(category)?;
        info!(admin = %admin.email(), category = %category, dry_run, "merge started");

        let lock = self.lock_unless_dry_run(category, "merge", dry_run).await?;
        let result = self.run_merge(category, schema, dry_run).await;
        self.release(lock).await;

        if let Ok(r) = &result {
            info!(
                category = %category,
                groups = r.duplicate_groups,
                merged = r.merged,
                deleted = r.deleted,
                final_count = r.final_count,
                errors = r.errors.len(),
                dry_run,
                "merge finished"
            );
        }
        result
    }

    fn require_schema(&self, category: &str) -> EngineResult<&FieldSchema> {
        validate_category(category)?;
        self.registry
            .schema(category)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::UnknownCategory(category.to_string()))
    }

    async fn lock_unless_dry_run(
        &self,
        category: &str,
        operation: &str,
        dry_run: bool,
    ) -> EngineResult<Option<CategoryLock>> {
        if dry_run {
            return Ok(None);
        }
        CategoryLock::acquire(self.store.clone(), category, operation, self.settings.lock_ttl)
            .await
            .map(Some)
    }

    async fn release(&self, lock: Option<CategoryLock>) {
        if let Some(lock) = lock {
            if let Err(e) = lock.release().await {
                warn!(error = %format!("{:#}", e), "failed to release category lock");
            }
        }
    }

    /// All records stored under the category prefix, in key order. Values
    /// that are not JSON objects are skipped.
    async fn load_records(&self, category: &str) -> EngineResult<Vec<CatalogRecord>> {
        let values = self
            .store
            .get_by_prefix(&category_prefix(category))
            .await
            .map_err(EngineError::Store)?;

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match CatalogRecord::from_value(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(category = %category, error = %e, "skipping stored value"),
            }
        }
        Ok(records)
    }

    /// Records that can be scored and mutated; the rest are logged.
    async fn load_valid_records(&self, category: &str) -> EngineResult<Vec<CatalogRecord>> {
        let records = self.load_records(category).await?;
        Ok(records
            .into_iter()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(category = %category, error = %e, "skipping invalid record");
                    false
                }
            })
            .collect())
    }

    async fn pace(&self, chunk_index: usize) {
        if chunk_index > 0 && !self.settings.batch_delay.is_zero() {
            tokio::time::sleep(self.settings.batch_delay).await;
        }
    }

    async fn run_standardize(
        &self,
        category: &str,
        schema: &FieldSchema,
        dry_run: bool,
    ) -> EngineResult<StandardizationResult> {
        let records = self.load_valid_records(category).await?;
        let mut result = StandardizationResult {
            total: records.len(),
            dry_run,
            ..Default::default()
        };

        let targets: Vec<&CatalogRecord> = records
            .iter()
            .filter(|r| score_record(r, schema).needs_standardization(self.settings.threshold))
            .collect();

        for (chunk_index, chunk) in targets.chunks(self.settings.batch_size).enumerate() {
            self.pace(chunk_index).await;

            for record in chunk {
                let id = record.id().unwrap_or_default();
                let outcome =
                    match standardize_record(record, schema, self.generator.as_ref(), Utc::now())
                        .await
                    {
                        Ok(Some(outcome)) => outcome,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(category = %category, record_id = %id, error = %format!("{:#}", e), "standardize failed");
                            result.errors.push(format!("{}: {:#}", id, e));
                            continue;
                        }
                    };

                let processed = ProcessedRecord::from_outcome(&outcome);
                if !dry_run {
                    let value = outcome.record.into_value();
                    if let Err(e) = self.store.set(&record_key(category, id), &value).await {
                        warn!(category = %category, record_id = %id, error = %format!("{:#}", e), "failed to persist standardized record");
                        result.errors.push(format!("{}: {:#}", id, e));
                        continue;
                    }
                }

                result.standardized += 1;
                if processed.enhanced {
                    result.enhanced += 1;
                }
                result.processed_records.push(processed);
            }
        }

        Ok(result)
    }

    async fn run_merge(
        &self,
        category: &str,
        schema: &FieldSchema,
        dry_run: bool,
    ) -> EngineResult<MergeResult> {
        let records = self.load_valid_records(category).await?;
        let clusters = cluster_by_name(&records);
        let mut result = MergeResult {
            duplicate_groups: clusters.len(),
            dry_run,
            ..Default::default()
        };

        for (chunk_index, chunk) in clusters.chunks(self.settings.batch_size).enumerate() {
            self.pace(chunk_index).await;

            for cluster in chunk {
                let candidates: Vec<MergeCandidate<'_>> = cluster
                    .members
                    .iter()
                    .map(|&r| MergeCandidate::scored(r, &score_record(r, schema)))
                    .collect();
                let Some(plan) = plan_merge(&cluster.key, candidates, schema, Utc::now()) else {
                    continue;
                };
                let display_name = plan.record.name().unwrap_or(&plan.key).to_string();

                if dry_run {
                    result.merged += 1;
                    result.deleted += plan.merged_ids.len();
                    result
                        .merge_results
                        .push(MergeAudit::new(display_name, plan.primary_id, plan.merged_ids));
                    continue;
                }

                let primary_key = record_key(category, &plan.primary_id);
                let value = plan.record.into_value();
                if let Err(e) = self.store.set(&primary_key, &value).await {
                    warn!(
                        category = %category,
                        record_id = %plan.primary_id,
                        error = %format!("{:#}", e),
                        "failed to persist merged primary, group left untouched"
                    );
                    result.errors.push(format!(
                        "{}: failed to persist primary {}: {:#}",
                        plan.key, plan.primary_id, e
                    ));
                    continue;
                }
                result.merged += 1;

                for loser in &plan.merged_ids {
                    match self.store.delete(&record_key(category, loser)).await {
                        Ok(()) => result.deleted += 1,
                        Err(e) => {
                            warn!(category = %category, record_id = %loser, error = %format!("{:#}", e), "failed to delete merged record");
                            result
                                .errors
                                .push(format!("{}: failed to delete {}: {:#}", plan.key, loser, e));
                        }
                    }
                }

                info!(
                    category = %category,
                    primary = %plan.primary_id,
                    absorbed = plan.merged_ids.len(),
                    "duplicate group merged"
                );
                result
                    .merge_results
                    .push(MergeAudit::new(display_name, plan.primary_id, plan.merged_ids));
            }
        }

        result.final_count = records.len().saturating_sub(result.deleted);
        Ok(result)
    }
}

impl Default for CatalogEngine {
    /// In-memory engine with default settings; used by tests and embedders.
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            FieldRegistry::builtin(),
            Arc::new(TemplateGenerator::new("https://images.example.invalid/catalog")),
            EngineSettings::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert!(validate_category("nutrient").is_ok());
        assert!(validate_category("food-group_2").is_ok());
        assert!(validate_category("").is_err());
        assert!(validate_category("Nutrient").is_err());
        assert!(validate_category("a:b").is_err());
        assert!(validate_category("_locks/x").is_err());
        assert!(validate_category(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_unknown_category_analyzes_empty_but_rejects_mutation() {
        let engine = CatalogEngine::default();
        let admin = AdminIdentity::local_operator();

        let analysis = engine.analyze(&admin, "spices").await.unwrap();
        assert_eq!(analysis.summary.total_nutrients, 0);
        assert!(analysis.expected_fields.is_empty());

        assert!(matches!(
            engine.standardize(&admin, "spices", false).await,
            Err(EngineError::UnknownCategory(_))
        ));
        assert!(matches!(
            engine.merge_duplicates(&admin, "spices", true).await,
            Err(EngineError::UnknownCategory(_))
        ));
    }
}
