//! Storage abstraction for Catalog Steward.
//!
//! The [`RecordStore`] trait is the key-value contract the engine depends
//! on: single-key reads, writes and deletes, plus a prefix scan used to
//! enumerate a category. There are no multi-key transactions; the engine is
//! written so every mutation sequence can be safely re-run instead.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Abstract key-value store holding JSON values.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](RecordStore::get) | Read one value |
/// | [`set`](RecordStore::set) | Insert or replace one value |
/// | [`set_if_absent`](RecordStore::set_if_absent) | Conditional insert (used for locks) |
/// | [`delete`](RecordStore::delete) | Remove one key (no-op when absent) |
/// | [`delete_if_equals`](RecordStore::delete_if_equals) | Conditional delete (used for locks) |
/// | [`get_by_prefix`](RecordStore::get_by_prefix) | All values whose key starts with a prefix, in key order |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Insert `value` only if `key` does not exist. Returns `true` when the
    /// value was written.
    async fn set_if_absent(&self, key: &str, value: &Value) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete `key` only if its current value equals `expected`. Returns
    /// `true` when the key was removed.
    async fn delete_if_equals(&self, key: &str, expected: &Value) -> Result<bool>;

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>>;
}
