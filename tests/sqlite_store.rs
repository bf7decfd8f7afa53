//! SQLite record store tests, including a full merge over a real database.

use catalog_steward::auth::AdminIdentity;
use catalog_steward::config::{load_config, Config};
use catalog_steward::engine::CatalogEngine;
use catalog_steward::{db, migrate};
use catalog_steward::sqlite_store::SqliteStore;
use catalog_steward_core::store::RecordStore;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("steward.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/data/steward.sqlite\"\n\n[engine]\nbatch_delay_ms = 0\n",
            tmp.path().display()
        ),
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    (tmp, config)
}

async fn open_store(config: &Config) -> SqliteStore {
    migrate::run_migrations(config).await.unwrap();
    SqliteStore::new(db::connect(config).await.unwrap())
}

#[tokio::test]
async fn test_basic_operations() {
    let (_tmp, config) = setup();
    let store = open_store(&config).await;

    assert_eq!(store.get("nutrient:n1").await.unwrap(), None);

    store
        .set("nutrient:n1", &json!({"id": "n1", "name": "Zinc"}))
        .await
        .unwrap();
    store
        .set("nutrient:n1", &json!({"id": "n1", "name": "Zinc", "unit": "mg"}))
        .await
        .unwrap();
    assert_eq!(
        store.get("nutrient:n1").await.unwrap(),
        Some(json!({"id": "n1", "name": "Zinc", "unit": "mg"}))
    );

    store.delete("nutrient:n1").await.unwrap();
    store.delete("nutrient:n1").await.unwrap();
    assert_eq!(store.get("nutrient:n1").await.unwrap(), None);
}

#[tokio::test]
async fn test_set_if_absent() {
    let (_tmp, config) = setup();
    let store = open_store(&config).await;

    assert!(store.set_if_absent("_locks/nutrient", &json!({"owner": "a"})).await.unwrap());
    assert!(!store.set_if_absent("_locks/nutrient", &json!({"owner": "b"})).await.unwrap());
    assert_eq!(
        store.get("_locks/nutrient").await.unwrap(),
        Some(json!({"owner": "a"}))
    );
}

#[tokio::test]
async fn test_prefix_scan_is_ordered_and_exact() {
    let (_tmp, config) = setup();
    let store = open_store(&config).await;

    for key in ["nutrient:b", "nutrients:x", "nutrient:a", "_locks/nutrient", "product:a"] {
        store.set(key, &json!({"key": key})).await.unwrap();
    }

    let values = store.get_by_prefix("nutrient:").await.unwrap();
    assert_eq!(
        values,
        vec![json!({"key": "nutrient:a"}), json!({"key": "nutrient:b"})]
    );
}

#[tokio::test]
async fn test_delete_if_equals() {
    let (_tmp, config) = setup();
    let store = open_store(&config).await;

    let marker = json!({"owner": "a", "operation": "merge", "acquired_at": "2020-01-01T00:00:00Z"});
    store.set("_locks/nutrient", &marker).await.unwrap();

    let other = json!({"owner": "b", "operation": "merge", "acquired_at": "2020-01-01T00:00:00Z"});
    assert!(!store.delete_if_equals("_locks/nutrient", &other).await.unwrap());
    assert!(store.get("_locks/nutrient").await.unwrap().is_some());

    // The value read back compares equal to what is stored.
    let read_back = store.get("_locks/nutrient").await.unwrap().unwrap();
    assert!(store.delete_if_equals("_locks/nutrient", &read_back).await.unwrap());
    assert!(store.get("_locks/nutrient").await.unwrap().is_none());
    assert!(!store.delete_if_equals("_locks/nutrient", &marker).await.unwrap());
}

#[tokio::test]
async fn test_corrupt_row_does_not_hide_category() {
    let (_tmp, config) = setup();
    let store = Arc::new(open_store(&config).await);
    store
        .set("nutrient:n1", &json!({"id": "n1", "name": "Zinc"}))
        .await
        .unwrap();
    sqlx::query("INSERT INTO records (key, value_json, updated_at) VALUES (?, ?, 0)")
        .bind("nutrient:n2")
        .bind("{not json")
        .execute(store.pool())
        .await
        .unwrap();

    let values = store.get_by_prefix("nutrient:").await.unwrap();
    assert_eq!(values, vec![json!({"id": "n1", "name": "Zinc"})]);

    let engine = CatalogEngine::from_config(&config, store.clone());
    let analysis = engine
        .analyze(&AdminIdentity::local_operator(), "nutrient")
        .await
        .unwrap();
    assert_eq!(analysis.summary.total_nutrients, 1);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, config) = setup();
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
}

#[tokio::test]
async fn test_merge_over_sqlite() {
    let (_tmp, config) = setup();
    let store = Arc::new(open_store(&config).await);
    store
        .set(
            "nutrient:n1",
            &json!({"id": "n1", "name": "Zinc", "sources": ["USDA"]}),
        )
        .await
        .unwrap();
    store
        .set(
            "nutrient:n2",
            &json!({
                "id": "n2",
                "name": "zinc",
                "sources": ["EFSA"],
                "description": "Zinc is an essential trace mineral.",
            }),
        )
        .await
        .unwrap();

    let engine = CatalogEngine::from_config(&config, store.clone());
    let admin = AdminIdentity::local_operator();

    let result = engine.merge_duplicates(&admin, "nutrient", false).await.unwrap();
    assert_eq!(result.merge_results[0].primary_id, "n2");
    assert_eq!(result.deleted, 1);

    let primary = store.get("nutrient:n2").await.unwrap().unwrap();
    assert_eq!(primary["sources"], json!(["EFSA", "USDA"]));
    assert!(store.get("nutrient:n1").await.unwrap().is_none());
    assert!(store.get("_locks/nutrient").await.unwrap().is_none());

    let analysis = engine.analyze(&admin, "nutrient").await.unwrap();
    assert_eq!(analysis.summary.total_nutrients, 1);
    assert_eq!(analysis.summary.duplicate_groups, 0);
}
