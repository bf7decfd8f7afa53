//! # Catalog Steward Core
//!
//! Runtime-free logic for Catalog Steward: record model, field schema
//! registry, quality scoring, duplicate grouping, standardization, merge
//! planning, and the record store trait.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Store access, batching and locking are the
//! application crate's concern.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `CatalogRecord` and field presence rules |
//! | [`schema`] | Field schema registry |
//! | [`quality`] | Completeness / data-quality scoring and reports |
//! | [`duplicates`] | Name normalization and duplicate grouping |
//! | [`standardize`] | Missing-field filling and content generation |
//! | [`merge`] | Primary selection and lossless field merge |
//! | [`store`] | `RecordStore` trait and in-memory implementation |

pub mod duplicates;
pub mod merge;
pub mod models;
pub mod quality;
pub mod schema;
pub mod standardize;
pub mod store;
