// ABOUTME: Transfer engine contract for copying one table from source to destination
// ABOUTME: Requests describe the selection query and the output table options

pub mod ogr2ogr;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::names::QualifiedTableName;
use crate::planner::ImportAction;

pub use ogr2ogr::Ogr2OgrEngine;

/// One table copy.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source_table: QualifiedTableName,
    /// Row selection run against the source.
    pub select_sql: String,
    pub target: QualifiedTableName,
    pub geometry_column: String,
    /// Promoted geometry type; `NONE` for tables without geometry.
    pub geometry_type: String,
    pub overwrite: bool,
    pub spatial_reference: String,
}

impl TransferRequest {
    pub fn for_import(action: &ImportAction, config: &Config) -> Self {
        Self {
            source_table: action.source.clone(),
            select_sql: select_sql(&action.source, &action.fields),
            target: action.destination.clone(),
            geometry_column: config.geometry_column.clone(),
            geometry_type: action.geometry.clone(),
            overwrite: true,
            spatial_reference: config.spatial_reference.clone(),
        }
    }
}

/// Selection query over the source layer.
///
/// A table without attribute fields still selects its row id so the layer
/// is not empty.
pub fn select_sql(source: &QualifiedTableName, fields: &[String]) -> String {
    let columns = if fields.is_empty() {
        "objectid".to_string()
    } else {
        fields
            .iter()
            .map(|field| format!("\"{}\"", field))
            .collect::<Vec<_>>()
            .join(",")
    };

    format!("SELECT {} FROM \"{}\"", columns, source)
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub target: QualifiedTableName,
    pub elapsed: Duration,
}

/// Performs the bulk copy, reprojection and geometry promotion for one table.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReport>;
}
