//! Duplicate merge planning.
//!
//! Given the members of one duplicate group, [`plan_merge`] picks the
//! surviving primary record and computes its merged contents. It performs no
//! I/O; persisting the primary and deleting the others is the caller's job.
//!
//! # Primary selection
//!
//! Members are ranked by:
//!
//! 1. higher `dataQuality`
//! 2. higher `completeness`
//! 3. earlier `created_at` (records without a valid timestamp rank last)
//! 4. lexicographically smaller `id`
//!
//! The first member wins. The ranking is total, so the same group always
//! produces the same primary.
//!
//! # Field merge
//!
//! Fields are resolved over members in rank order:
//!
//! - **Scalars**: the first present value (the primary's, when it has one).
//! - **Arrays**: union of every member's array, de-duplicated
//!   case-insensitively for strings, in first-seen order starting with the
//!   primary's entries. When one member holds an array and another a plain
//!   value for the same field, the plain value joins the union as a single
//!   element.
//! - **Objects**: merged key by key with the same rules.
//!
//! Every field present on any member is present on the result. `verified`
//! is true if any member was verified, and `merged_ids` accumulates the ids
//! of absorbed records, including ids they had absorbed earlier.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{
    value_is_present, CatalogRecord, FIELD_ID, FIELD_MERGED_AT, FIELD_MERGED_IDS,
    FIELD_QUALITY_SCORE, FIELD_UPDATED_AT, FIELD_VERIFIED,
};
use crate::quality::{score_record, RecordScore};
use crate::schema::FieldSchema;

/// A group member together with its scores.
#[derive(Debug, Clone, Copy)]
pub struct MergeCandidate<'a> {
    pub record: &'a CatalogRecord,
    pub data_quality: u8,
    pub completeness: u8,
}

impl<'a> MergeCandidate<'a> {
    pub fn new(record: &'a CatalogRecord, data_quality: u8, completeness: u8) -> Self {
        Self {
            record,
            data_quality,
            completeness,
        }
    }

    pub fn scored(record: &'a CatalogRecord, score: &RecordScore) -> Self {
        Self::new(record, score.data_quality, score.completeness)
    }

    fn id(&self) -> &str {
        self.record.id().unwrap_or_default()
    }
}

/// Ranking used for primary selection; `Less` means higher priority.
pub fn priority_order(a: &MergeCandidate<'_>, b: &MergeCandidate<'_>) -> Ordering {
    b.data_quality
        .cmp(&a.data_quality)
        .then_with(|| b.completeness.cmp(&a.completeness))
        .then_with(|| match (a.record.created_at(), b.record.created_at()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id().cmp(b.id()))
}

/// The computed outcome of merging one group.
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Normalized name shared by the group.
    pub key: String,
    pub primary_id: String,
    /// Ids of the non-primary members, in rank order.
    pub merged_ids: Vec<String>,
    /// The primary's contents after absorbing the others.
    pub record: CatalogRecord,
}

/// Audit entry for one merged group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeAudit {
    pub name: String,
    pub primary_id: String,
    pub merged_ids: Vec<String>,
    pub total_merged: usize,
}

impl MergeAudit {
    pub fn new(name: impl Into<String>, primary_id: impl Into<String>, merged_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            primary_id: primary_id.into(),
            total_merged: merged_ids.len(),
            merged_ids,
        }
    }
}

/// Result of a merge run over one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Groups whose primary was persisted.
    pub merged: usize,
    /// Records removed from the store.
    pub deleted: usize,
    /// Duplicate groups found at the start of the run.
    pub duplicate_groups: usize,
    /// Valid records remaining after the run.
    pub final_count: usize,
    pub merge_results: Vec<MergeAudit>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// Plan the merge of one duplicate group.
///
/// `candidates` may be in any order. Returns `None` for groups of fewer
/// than two members.
pub fn plan_merge(
    key: &str,
    mut candidates: Vec<MergeCandidate<'_>>,
    schema: &FieldSchema,
    now: DateTime<Utc>,
) -> Option<MergePlan> {
    if candidates.len() < 2 {
        return None;
    }
    candidates.sort_by(priority_order);

    let primary_id = candidates[0].id().to_string();
    let merged_ids: Vec<String> = candidates[1..].iter().map(|c| c.id().to_string()).collect();

    let maps: Vec<&Map<String, Value>> = candidates.iter().map(|c| c.record.fields()).collect();
    let mut merged = merge_maps(&maps);

    merged.insert(FIELD_ID.to_string(), json!(primary_id));

    if candidates.iter().any(|c| c.record.is_verified()) {
        merged.insert(FIELD_VERIFIED.to_string(), json!(true));
    }

    let absorbed = candidates
        .iter()
        .filter_map(|c| c.record.get(FIELD_MERGED_IDS))
        .filter_map(Value::as_array)
        .flatten()
        .cloned()
        .chain(merged_ids.iter().map(|id| json!(id)))
        .filter(|v| v.as_str() != Some(primary_id.as_str()))
        .collect::<Vec<_>>();
    merged.insert(
        FIELD_MERGED_IDS.to_string(),
        Value::Array(union_values([absorbed.as_slice()])),
    );

    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    merged.insert(FIELD_MERGED_AT.to_string(), json!(stamp));
    merged.insert(FIELD_UPDATED_AT.to_string(), json!(stamp));

    let mut record = CatalogRecord::from_value(Value::Object(merged)).ok()?;
    let score = score_record(&record, schema);
    record.set(FIELD_QUALITY_SCORE, json!(score.data_quality));

    Some(MergePlan {
        key: key.to_string(),
        primary_id,
        merged_ids,
        record,
    })
}

/// Merge objects in priority order. Keys keep first-seen order.
fn merge_maps(maps: &[&Map<String, Value>]) -> Map<String, Value> {
    let mut keys: Vec<&String> = Vec::new();
    for map in maps {
        for key in map.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let mut out = Map::new();
    for key in keys {
        let values: Vec<&Value> = maps.iter().filter_map(|m| m.get(key.as_str())).collect();
        out.insert(key.clone(), merge_field(&values));
    }
    out
}

/// Resolve one field from member values in priority order.
fn merge_field(values: &[&Value]) -> Value {
    let present: Vec<&Value> = values.iter().copied().filter(|v| value_is_present(v)).collect();
    let Some(&first_present) = present.first() else {
        return values.first().map(|v| (*v).clone()).unwrap_or(Value::Null);
    };
    if present.iter().any(|v| v.is_array()) {
        return Value::Array(union_values(present.iter().copied().map(|v| match v {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        })));
    }
    match first_present {
        Value::Object(_) => {
            let maps: Vec<&Map<String, Value>> =
                values.iter().filter_map(|v| v.as_object()).collect();
            Value::Object(merge_maps(&maps))
        }
        scalar => scalar.clone(),
    }
}

fn dedup_key(value: &Value) -> String {
    match value {
        Value::String(s) => format!("s:{}", s.trim().to_lowercase()),
        other => format!("j:{}", other),
    }
}

/// Union of arrays in order, dropping case-insensitive string repeats,
/// structural repeats, and empty values.
fn union_values<'a, I>(arrays: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a [Value]>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for array in arrays {
        for value in array {
            if !value_is_present(value) {
                continue;
            }
            if seen.insert(dedup_key(value)) {
                out.push(value.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldRegistry;
    use chrono::TimeZone;

    fn rec(value: Value) -> CatalogRecord {
        CatalogRecord::from_value(value).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn schema() -> FieldSchema {
        FieldRegistry::builtin().field_definitions("nutrient")
    }

    #[test]
    fn test_zinc_scenario() {
        let n1 = rec(json!({"id": "n1", "name": "Zinc", "sources": ["USDA"]}));
        let n2 = rec(json!({"id": "n2", "name": "zinc", "sources": ["EFSA"]}));
        let plan = plan_merge(
            "zinc",
            vec![MergeCandidate::new(&n1, 60, 50), MergeCandidate::new(&n2, 80, 50)],
            &schema(),
            now(),
        )
        .unwrap();

        assert_eq!(plan.primary_id, "n2");
        assert_eq!(plan.merged_ids, vec!["n1"]);
        assert_eq!(plan.record.get("sources"), Some(&json!(["EFSA", "USDA"])));
        assert_eq!(plan.record.get_str("name"), Some("zinc"));
        assert_eq!(plan.record.get("merged_ids"), Some(&json!(["n1"])));
        assert_eq!(plan.record.get_str("merged_at"), Some("2025-06-01T12:00:00Z"));
    }

    #[test]
    fn test_tie_breaks_are_deterministic() {
        let early = rec(json!({"id": "b", "name": "Iron", "created_at": "2023-01-01T00:00:00Z"}));
        let late = rec(json!({"id": "a", "name": "Iron", "created_at": "2024-01-01T00:00:00Z"}));
        let undated = rec(json!({"id": "0", "name": "Iron"}));

        let order = |records: [&CatalogRecord; 3]| {
            let plan = plan_merge(
                "iron",
                records.iter().map(|r| MergeCandidate::new(r, 70, 70)).collect(),
                &schema(),
                now(),
            )
            .unwrap();
            (plan.primary_id, plan.merged_ids)
        };

        let expected = ("b".to_string(), vec!["a".to_string(), "0".to_string()]);
        assert_eq!(order([&early, &late, &undated]), expected);
        assert_eq!(order([&undated, &late, &early]), expected);

        let x = rec(json!({"id": "x", "name": "Iron"}));
        let y = rec(json!({"id": "y", "name": "Iron"}));
        let plan = plan_merge(
            "iron",
            vec![MergeCandidate::new(&y, 70, 70), MergeCandidate::new(&x, 70, 70)],
            &schema(),
            now(),
        )
        .unwrap();
        assert_eq!(plan.primary_id, "x");
    }

    #[test]
    fn test_completeness_breaks_quality_tie() {
        let a = rec(json!({"id": "a", "name": "Iron"}));
        let b = rec(json!({"id": "b", "name": "Iron"}));
        let plan = plan_merge(
            "iron",
            vec![MergeCandidate::new(&a, 70, 60), MergeCandidate::new(&b, 70, 65)],
            &schema(),
            now(),
        )
        .unwrap();
        assert_eq!(plan.primary_id, "b");
    }

    #[test]
    fn test_merge_is_lossless() {
        let primary = rec(json!({
            "id": "p",
            "name": "Vitamin C",
            "description": "",
            "unit": "mg",
            "tags": ["Antioxidant"],
            "per_100g": {"orange": 53.2},
        }));
        let other = rec(json!({
            "id": "o",
            "name": "vitamin c",
            "description": "Water-soluble vitamin.",
            "unit": "µg",
            "scientific_name": "ascorbic acid",
            "tags": ["antioxidant", "immune"],
            "per_100g": {"orange": 50.0, "kiwi": 92.7},
            "verified": true,
        }));
        let plan = plan_merge(
            "vitamin c",
            vec![MergeCandidate::new(&primary, 90, 90), MergeCandidate::new(&other, 40, 40)],
            &schema(),
            now(),
        )
        .unwrap();
        let r = &plan.record;

        for (field, _) in primary.fields().iter().chain(other.fields().iter()) {
            let was_present = primary.is_present(field) || other.is_present(field);
            if was_present {
                assert!(r.is_present(field), "field {} lost in merge", field);
            }
        }
        assert_eq!(r.get_str("description"), Some("Water-soluble vitamin."));
        assert_eq!(r.get_str("unit"), Some("mg"));
        assert_eq!(r.get("tags"), Some(&json!(["Antioxidant", "immune"])));
        assert_eq!(
            r.get("per_100g"),
            Some(&json!({"orange": 53.2, "kiwi": 92.7}))
        );
        assert!(r.is_verified());
        assert_eq!(r.get_str("id"), Some("p"));
    }

    #[test]
    fn test_plain_value_joins_array_union() {
        let p = rec(json!({"id": "p", "name": "Zinc", "tags": "mineral", "sources": ["USDA"]}));
        let q = rec(json!({"id": "q", "name": "Zinc", "tags": ["trace", "essential"], "sources": "usda"}));
        let plan = plan_merge(
            "zinc",
            vec![MergeCandidate::new(&p, 80, 80), MergeCandidate::new(&q, 20, 20)],
            &schema(),
            now(),
        )
        .unwrap();

        assert_eq!(plan.primary_id, "p");
        assert_eq!(
            plan.record.get("tags"),
            Some(&json!(["mineral", "trace", "essential"]))
        );
        assert_eq!(plan.record.get("sources"), Some(&json!(["USDA"])));
    }

    #[test]
    fn test_merged_ids_accumulate_across_merges() {
        let p = rec(json!({"id": "p", "name": "Zinc", "merged_ids": ["old1"]}));
        let q = rec(json!({"id": "q", "name": "Zinc", "merged_ids": ["old2", "p"]}));
        let plan = plan_merge(
            "zinc",
            vec![MergeCandidate::new(&p, 80, 80), MergeCandidate::new(&q, 20, 20)],
            &schema(),
            now(),
        )
        .unwrap();
        assert_eq!(
            plan.record.get("merged_ids"),
            Some(&json!(["old1", "old2", "q"]))
        );
    }

    #[test]
    fn test_singleton_group_has_no_plan() {
        let p = rec(json!({"id": "p", "name": "Zinc"}));
        assert!(plan_merge("zinc", vec![MergeCandidate::new(&p, 1, 1)], &schema(), now()).is_none());
    }

    #[test]
    fn test_quality_score_reflects_merged_record() {
        let a = rec(json!({"id": "a", "name": "Zinc", "unit": "mg"}));
        let b = rec(json!({"id": "b", "name": "Zinc", "description": "Essential trace mineral."}));
        let plan = plan_merge(
            "zinc",
            vec![MergeCandidate::new(&a, 10, 10), MergeCandidate::new(&b, 10, 10)],
            &schema(),
            now(),
        )
        .unwrap();
        let expected = score_record(&plan.record, &schema()).data_quality;
        assert_eq!(plan.record.get("quality_score"), Some(&json!(expected)));
    }
}
