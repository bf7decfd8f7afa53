//! Name-based duplicate grouping.
//!
//! Two records are duplicate candidates when their names normalize to the
//! same key. Normalization is purely lexical: lower-case, collapse runs of
//! whitespace, and strip non-alphanumeric characters from both ends. There
//! is no fuzzy or semantic matching.
//!
//! ```rust
//! use catalog_steward_core::duplicates::normalize_name;
//!
//! assert_eq!(normalize_name("  Vitamin   C "), "vitamin c");
//! assert_eq!(normalize_name("Zinc."), "zinc");
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::CatalogRecord;

/// Reference to one member of a [`DuplicateGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMember {
    pub id: String,
    pub category: String,
    pub source: Option<String>,
}

/// Records sharing one normalized name. `count == records.len() >= 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// Normalized name key.
    pub name: String,
    pub count: usize,
    pub records: Vec<DuplicateMember>,
}

/// A duplicate group that still borrows its member records.
#[derive(Debug, Clone)]
pub struct DuplicateCluster<'a> {
    pub key: String,
    pub members: Vec<&'a CatalogRecord>,
}

impl DuplicateCluster<'_> {
    /// Owned summary of the cluster. `fallback_category` is used for members
    /// without a `category` tag.
    pub fn to_group(&self, fallback_category: &str) -> DuplicateGroup {
        DuplicateGroup {
            name: self.key.clone(),
            count: self.members.len(),
            records: self
                .members
                .iter()
                .map(|r| DuplicateMember {
                    id: r.id().unwrap_or_default().to_string(),
                    category: r
                        .get_str("category")
                        .unwrap_or(fallback_category)
                        .to_string(),
                    source: r.source().map(str::to_string),
                })
                .collect(),
        }
    }
}

/// Normalize a display name into a grouping key.
pub fn normalize_name(name: &str) -> String {
    let collapsed = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

/// Partition records by normalized name and keep groups of two or more.
///
/// Records without an id or name, and names that normalize to an empty key,
/// are never grouped. Groups are sorted by size (desc), then key (asc);
/// members keep their input order.
pub fn cluster_by_name<'a, I>(records: I) -> Vec<DuplicateCluster<'a>>
where
    I: IntoIterator<Item = &'a CatalogRecord>,
{
    let mut buckets: BTreeMap<String, Vec<&'a CatalogRecord>> = BTreeMap::new();
    for record in records {
        if record.id().is_none() {
            continue;
        }
        let Some(name) = record.name() else {
            continue;
        };
        let key = normalize_name(name);
        if key.is_empty() {
            continue;
        }
        buckets.entry(key).or_default().push(record);
    }

    let mut clusters: Vec<DuplicateCluster<'a>> = buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, members)| DuplicateCluster { key, members })
        .collect();
    // Stable sort: equal sizes keep BTreeMap (key) order.
    clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
    clusters
}

/// Duplicate groups for a category, ready to report.
pub fn find_duplicates(records: &[CatalogRecord], category: &str) -> Vec<DuplicateGroup> {
    cluster_by_name(records)
        .iter()
        .map(|c| c.to_group(category))
        .collect()
}
