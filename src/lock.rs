//! Per-category exclusive lock for mutating runs.
//!
//! The store has no row locks, so standardize and merge claim a sentinel key
//! (`_locks/{category}`) with [`RecordStore::set_if_absent`] before touching
//! any record, and delete it when done. A second mutating run for the same
//! category sees the sentinel and is rejected as busy.
//!
//! A sentinel older than the configured TTL belongs to a run that died
//! without releasing it and is taken over. Release only deletes the sentinel
//! if it still carries this lock's owner token.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use catalog_steward_core::store::RecordStore;

use crate::error::{EngineError, EngineResult};

/// Store key prefix of lock sentinels. Never overlaps a category prefix.
pub const LOCK_PREFIX: &str = "_locks/";

pub fn lock_key(category: &str) -> String {
    format!("{}{}", LOCK_PREFIX, category)
}

/// Value written under the sentinel key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMarker {
    pub owner: String,
    pub category: String,
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockMarker {
    fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36500));
        now.signed_duration_since(self.acquired_at) > ttl
    }
}

/// A held category lock. Call [`CategoryLock::release`] when the run ends.
///
/// Dropping a lock that was never released (a run whose future was
/// cancelled, or a panic) releases it from a background task.
pub struct CategoryLock {
    store: Arc<dyn RecordStore>,
    key: String,
    owner: String,
    category: String,
    released: bool,
}

impl std::fmt::Debug for CategoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryLock")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish()
    }
}

impl CategoryLock {
    /// Claim the lock for `category`, or fail with [`EngineError::Busy`].
    pub async fn acquire(
        store: Arc<dyn RecordStore>,
        category: &str,
        operation: &str,
        ttl: Duration,
    ) -> EngineResult<Self> {
        let key = lock_key(category);
        let marker = LockMarker {
            owner: Uuid::new_v4().to_string(),
            category: category.to_string(),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        };
        let value = serde_json::to_value(&marker)
            .map_err(|e| EngineError::Store(anyhow::Error::new(e)))?;

        let held = |store: Arc<dyn RecordStore>, key: String| {
            info!(category = %category, operation = %operation, "category lock acquired");
            Self {
                store,
                key,
                owner: marker.owner.clone(),
                category: category.to_string(),
                released: false,
            }
        };

        if try_claim(store.as_ref(), &key, &value).await? {
            return Ok(held(store, key));
        }

        if let Some(existing) = store.get(&key).await.map_err(EngineError::Store)? {
            match serde_json::from_value::<LockMarker>(existing.clone()) {
                Ok(held) if !held.is_stale(ttl, Utc::now()) => {
                    debug!(category = %category, held_by = %held.operation, "category lock busy");
                    return Err(busy(category, held.operation));
                }
                Ok(stale) => warn!(
                    category = %category,
                    operation = %stale.operation,
                    acquired_at = %stale.acquired_at,
                    "taking over abandoned category lock"
                ),
                Err(_) => warn!(category = %category, "replacing unreadable category lock"),
            }
            // Only the exact marker inspected above is removed; if another
            // caller took it over in the meantime, its sentinel survives and
            // the claim below fails.
            store
                .delete_if_equals(&key, &existing)
                .await
                .map_err(EngineError::Store)?;
        }

        if try_claim(store.as_ref(), &key, &value).await? {
            return Ok(held(store, key));
        }

        let holder = store
            .get(&key)
            .await
            .map_err(EngineError::Store)?
            .and_then(|v| serde_json::from_value::<LockMarker>(v).ok())
            .map(|m| m.operation)
            .unwrap_or_else(|| "another operation".to_string());
        Err(busy(category, holder))
    }

    /// Delete the sentinel if this lock still owns it.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        release_owned(self.store.as_ref(), &self.key, &self.owner, &self.category).await
    }
}

impl Drop for CategoryLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(category = %self.category, "category lock dropped outside a runtime, left to expire");
            return;
        };
        warn!(category = %self.category, "category lock dropped without release");
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        let category = std::mem::take(&mut self.category);
        runtime.spawn(async move {
            if let Err(e) = release_owned(store.as_ref(), &key, &owner, &category).await {
                warn!(category = %category, error = %format!("{:#}", e), "failed to release dropped category lock");
            }
        });
    }
}

async fn release_owned(store: &dyn RecordStore, key: &str, owner: &str, category: &str) -> Result<()> {
    let Some(current) = store.get(key).await? else {
        warn!(category = %category, "category lock was already gone at release");
        return Ok(());
    };
    let owned = serde_json::from_value::<LockMarker>(current.clone())
        .is_ok_and(|m| m.owner == owner);
    if owned && store.delete_if_equals(key, &current).await? {
        info!(category = %category, "category lock released");
    } else {
        warn!(category = %category, "category lock was taken over before release");
    }
    Ok(())
}

fn busy(category: &str, operation: String) -> EngineError {
    EngineError::Busy {
        category: category.to_string(),
        operation,
    }
}

async fn try_claim(store: &dyn RecordStore, key: &str, value: &Value) -> EngineResult<bool> {
    store
        .set_if_absent(key, value)
        .await
        .map_err(EngineError::Store)
}
