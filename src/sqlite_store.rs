//! SQLite-backed [`RecordStore`] implementation.
//!
//! Every key maps to one row of the `records` table, with the value stored
//! as JSON text. Prefix scans are ordered by key, matching the in-memory
//! store. A row whose JSON cannot be decoded is skipped by prefix scans with
//! a warning, so one corrupt record does not hide the rest of its category.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use catalog_steward_core::store::RecordStore;

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode(key: &str, json: &str) -> Result<Value> {
    serde_json::from_str(json).with_context(|| format!("corrupt JSON stored under key {}", key))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value_json FROM records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("value_json");
                Ok(Some(decode(key, &json)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO records (key, value_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &Value) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO records (key, value_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &Value) -> Result<bool> {
        // Stored text is always `Value::to_string` output, which re-serializes
        // identically after a round trip.
        let result = sqlx::query("DELETE FROM records WHERE key = ? AND value_json = ?")
            .bind(key)
            .bind(expected.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>> {
        let rows = sqlx::query(
            r#"
            SELECT key, value_json
            FROM records
            WHERE substr(key, 1, ?) = ?
            ORDER BY key ASC
            "#,
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.get("key");
            let json: String = row.get("value_json");
            match decode(&key, &json) {
                Ok(value) => values.push(value),
                Err(e) => warn!(key = %key, error = %format!("{:#}", e), "skipping corrupt row"),
            }
        }
        Ok(values)
    }
}
