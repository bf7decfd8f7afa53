//! # Catalog Steward
//!
//! Data-quality, standardization and duplicate-merge engine for nutrition
//! catalog records.
//!
//! The pure algorithms (scoring, grouping, filling, merge planning) live in
//! [`catalog_steward_core`]. This crate adds the runtime around them: a
//! SQLite-backed record store, per-category locking, the [`engine`] service
//! with batching and error collection, an admin HTTP API and the `steward`
//! CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │   CLI    │   │   HTTP   │
//! │(steward) │   │  (axum)  │
//! └────┬─────┘   └────┬─────┘
//!      └──────┬───────┘
//!             ▼
//!     ┌───────────────┐   ┌──────────────┐
//!     │ CatalogEngine │──▶│ core: score, │
//!     │ lock + batch  │   │ group, merge │
//!     └──────┬────────┘   └──────────────┘
//!            ▼
//!     ┌───────────────┐
//!     │  RecordStore  │
//!     │ SQLite / mem  │
//!     └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Admin authorization capability |
//! | [`commands`] | CLI command implementations |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`engine`] | Analyze, standardize and merge operations |
//! | [`error`] | Category-level engine errors |
//! | [`import`] | JSON record import |
//! | [`lock`] | Per-category exclusive lock |
//! | [`migrate`] | Schema migrations |
//! | [`server`] | Admin HTTP server |
//! | [`sqlite_store`] | SQLite `RecordStore` implementation |

pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod import;
pub mod lock;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
