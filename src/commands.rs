//! CLI command implementations.
//!
//! Most `run_*` functions open the configured database, run one engine
//! operation as the local operator and print the result: a human-readable
//! report by default, or pretty JSON with `--json`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use catalog_steward_core::merge::MergeResult;
use catalog_steward_core::quality::QualitySummary;
use catalog_steward_core::schema::{FieldRegistry, SCHEMA_VERSION};
use catalog_steward_core::standardize::StandardizationResult;

use crate::auth::AdminIdentity;
use crate::config::Config;
use crate::db;
use crate::engine::CatalogEngine;
use crate::import::{import_records, read_records_file};
use crate::sqlite_store::SqliteStore;

async fn open_engine(config: &Config) -> Result<CatalogEngine> {
    let pool = db::connect(config).await?;
    Ok(CatalogEngine::from_config(config, Arc::new(SqliteStore::new(pool))))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(category: &str, summary: &QualitySummary) {
    println!("Catalog quality: {}", category);
    println!("================================");
    println!("  Records:                {}", summary.total_nutrients);
    println!("  Avg completeness:       {:.1}%", summary.average_completeness);
    println!("  Avg data quality:       {:.1}%", summary.average_data_quality);
    println!(
        "  Needs standardization:  {} (threshold {}%)",
        summary.needs_standardization, summary.threshold
    );
    println!(
        "  Duplicate groups:       {} ({} redundant records)",
        summary.duplicate_groups, summary.total_duplicates
    );
    if summary.invalid_records > 0 {
        println!("  Invalid records:        {}", summary.invalid_records);
    }
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("Errors ({}):", errors.len());
    for e in errors {
        println!("  - {}", e);
    }
}

/// Re-analyze after a mutating run so the operator sees the new state.
async fn print_refreshed_summary(engine: &CatalogEngine, category: &str) -> Result<()> {
    let analysis = engine
        .analyze(&AdminIdentity::local_operator(), category)
        .await?;
    println!();
    print_summary(category, &analysis.summary);
    Ok(())
}

pub async fn run_import(config: &Config, category: &str, file: &Path) -> Result<()> {
    let values = read_records_file(file)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let summary = import_records(&store, category, values).await?;
    store.pool().close().await;

    println!(
        "Imported {} records into '{}' ({} skipped).",
        summary.imported, category, summary.skipped
    );
    Ok(())
}

pub fn run_categories() -> Result<()> {
    let registry = FieldRegistry::builtin();
    println!("Schema version {}", SCHEMA_VERSION);
    for category in registry.categories() {
        let schema = registry.field_definitions(category);
        println!(
            "{:<12} {} fields ({} required)",
            category,
            schema.len(),
            schema.required_count()
        );
    }
    Ok(())
}

pub fn run_fields(category: &str) -> Result<()> {
    print_json(&FieldRegistry::builtin().field_definitions(category))
}

pub async fn run_analyze(config: &Config, category: &str, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let analysis = engine
        .analyze(&AdminIdentity::local_operator(), category)
        .await?;

    if json {
        return print_json(&analysis);
    }

    print_summary(category, &analysis.summary);
    if !analysis.needs_standardization.is_empty() {
        println!();
        println!("Below threshold:");
        for item in &analysis.needs_standardization {
            println!(
                "  {:<24} {:>3}% complete, {:>3}% quality, missing: {}",
                item.name,
                item.completeness,
                item.data_quality,
                item.missing_fields.join(", ")
            );
        }
    }
    if !analysis.duplicates.is_empty() {
        println!();
        println!("Duplicate groups:");
        for group in &analysis.duplicates {
            let ids: Vec<&str> = group.records.iter().map(|m| m.id.as_str()).collect();
            println!("  {:<24} x{}  [{}]", group.name, group.count, ids.join(", "));
        }
    }
    Ok(())
}

pub async fn run_standardize(
    config: &Config,
    category: &str,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let result = engine
        .standardize(&AdminIdentity::local_operator(), category, dry_run)
        .await?;

    if json {
        return print_json(&result);
    }

    print_standardization(&result);
    if !dry_run {
        print_refreshed_summary(&engine, category).await?;
    }
    Ok(())
}

fn print_standardization(result: &StandardizationResult) {
    let verb = if result.dry_run { "Would standardize" } else { "Standardized" };
    println!(
        "{} {} of {} records ({} enhanced).",
        verb, result.standardized, result.total, result.enhanced
    );
    for record in &result.processed_records {
        println!(
            "  {:<24} {:>3}% -> {:>3}%  filled: {}",
            record.name,
            record.completeness_before,
            record.completeness_after,
            record.filled_fields.join(", ")
        );
    }
    print_errors(&result.errors);
}

pub async fn run_merge(config: &Config, category: &str, dry_run: bool, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let result = engine
        .merge_duplicates(&AdminIdentity::local_operator(), category, dry_run)
        .await?;

    if json {
        return print_json(&result);
    }

    print_merge(&result);
    if !dry_run {
        print_refreshed_summary(&engine, category).await?;
    }
    Ok(())
}

fn print_merge(result: &MergeResult) {
    let verb = if result.dry_run { "Would merge" } else { "Merged" };
    println!(
        "{} {} of {} duplicate groups, {} records removed, {} remain.",
        verb, result.merged, result.duplicate_groups, result.deleted, result.final_count
    );
    for audit in &result.merge_results {
        println!(
            "  {:<24} kept {} absorbed [{}]",
            audit.name,
            audit.primary_id,
            audit.merged_ids.join(", ")
        );
    }
    print_errors(&result.errors);
}

pub async fn run_get(config: &Config, category: &str, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;
    let record = engine
        .get_record(category, id)
        .await?
        .with_context(|| format!("record not found: {}:{}", category, id))?;
    print_json(&record)
}
