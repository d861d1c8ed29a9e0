// ABOUTME: Library root for catalog-sync
// ABOUTME: Reconciles a spatial warehouse table catalog into a PostGIS database

pub mod catalog;
pub mod change_detection;
pub mod commands;
pub mod config;
pub mod destination;
pub mod error;
pub mod executor;
pub mod indexes;
pub mod metadata;
pub mod names;
pub mod planner;
pub mod reconcile;
pub mod schema_align;
pub mod source;
pub mod transfer;
pub mod utils;

pub use catalog::CatalogCache;
pub use config::Config;
pub use error::SyncError;
pub use executor::RunSummary;
pub use names::{NameMapper, QualifiedTableName};
