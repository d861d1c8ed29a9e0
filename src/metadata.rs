// ABOUTME: Metadata index mapping source tables to destination names and geometry
// ABOUTME: Rebuilt every run from the warehouse's published-items table

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;

use crate::names::{NameMapper, QualifiedTableName};
use crate::source::SourceWarehouse;

/// Geometry kind declared for a source table in the metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Polygon,
    Polyline,
    StandAlone,
    Other(String),
}

impl GeometryKind {
    /// Known kinds match case-insensitively; anything else is kept as written.
    pub fn parse(value: Option<&str>) -> Self {
        let value = value.map(str::trim).unwrap_or_default();

        match value.to_uppercase().as_str() {
            "POINT" => GeometryKind::Point,
            "POLYGON" => GeometryKind::Polygon,
            "POLYLINE" => GeometryKind::Polyline,
            "STAND ALONE" | "STAND_ALONE" => GeometryKind::StandAlone,
            _ => GeometryKind::Other(value.to_string()),
        }
    }

    /// Geometry type requested from the transfer engine.
    ///
    /// Polygons and lines are always promoted to their multi-part types and
    /// stand-alone tables get no geometry column. Anything else passes through;
    /// an undeclared kind becomes the generic `GEOMETRY`.
    pub fn promoted(&self) -> &str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::Polygon => "MULTIPOLYGON",
            GeometryKind::Polyline => "MULTILINESTRING",
            GeometryKind::StandAlone => "NONE",
            GeometryKind::Other(value) if value.is_empty() => "GEOMETRY",
            GeometryKind::Other(value) => value.as_str(),
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryKind::Point => write!(f, "POINT"),
            GeometryKind::Polygon => write!(f, "POLYGON"),
            GeometryKind::Polyline => write!(f, "POLYLINE"),
            GeometryKind::StandAlone => write!(f, "STAND ALONE"),
            GeometryKind::Other(value) => write!(f, "{}", value),
        }
    }
}

/// One row of the external metadata table, as read from the source.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub table: String,
    pub title: Option<String>,
    pub geometry_type: Option<String>,
}

/// How a source table should appear in the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadataEntry {
    pub source: QualifiedTableName,
    /// Slugged title; `None` means the table has no destination name.
    pub destination_title: Option<String>,
    pub geometry: GeometryKind,
}

impl TableMetadataEntry {
    pub fn destination(&self) -> Option<QualifiedTableName> {
        self.destination_title
            .as_deref()
            .map(|title| self.source.with_table(title))
    }
}

/// Source table → destination title and geometry kind, grouped by schema.
///
/// Immutable once built. Duplicate source rows overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    schemas: HashMap<String, HashMap<String, TableMetadataEntry>>,
}

impl MetadataIndex {
    /// Query the source metadata table and build the index.
    ///
    /// There are no retries: without the index no planning can happen.
    pub async fn build(source: &dyn SourceWarehouse, names: &NameMapper) -> Result<Self> {
        tracing::debug!("Reading table metadata from {}", source.connection_key());

        let rows = source
            .metadata_rows()
            .await
            .context("Failed to read the metadata table")?;

        let index = Self::from_rows(rows, names)?;
        tracing::info!("Loaded metadata for {} source tables", index.len());

        Ok(index)
    }

    pub fn from_rows(rows: Vec<MetadataRow>, names: &NameMapper) -> Result<Self> {
        let mut schemas: HashMap<String, HashMap<String, TableMetadataEntry>> = HashMap::new();

        for row in rows {
            let source = names
                .split(&row.table)
                .with_context(|| format!("Invalid table name in metadata row: {}", row.table))?;

            let entry = TableMetadataEntry {
                destination_title: names.slug(row.title.as_deref()),
                geometry: GeometryKind::parse(row.geometry_type.as_deref()),
                source: source.clone(),
            };

            schemas
                .entry(source.schema().to_string())
                .or_default()
                .insert(source.table().to_string(), entry);
        }

        Ok(Self { schemas })
    }

    pub fn get(&self, source: &QualifiedTableName) -> Option<&TableMetadataEntry> {
        self.schemas
            .get(source.schema())
            .and_then(|tables| tables.get(source.table()))
    }

    /// Destination name for a source table, if the metadata defines one.
    pub fn destination_for(&self, source: &QualifiedTableName) -> Option<QualifiedTableName> {
        self.get(source).and_then(TableMetadataEntry::destination)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableMetadataEntry> {
        self.schemas.values().flat_map(|tables| tables.values())
    }

    pub fn len(&self) -> usize {
        self.schemas.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
