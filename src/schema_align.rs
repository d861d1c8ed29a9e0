// ABOUTME: Post-import alignment of integer column widths with the source
// ABOUTME: Emits one ALTER TABLE per table for columns whose type differs

use anyhow::{Context, Result};

use crate::destination::DestinationDatabase;
use crate::executor::RunSummary;
use crate::metadata::MetadataIndex;
use crate::names::QualifiedTableName;
use crate::source::{IntegerColumn, SourceWarehouse};
use crate::utils::quote_ident;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignOutcome {
    /// The statement that was run, or would have been in a dry run.
    Altered(String),
    /// No integer column needed a change.
    Skipped,
}

/// PostgreSQL spelling of a SQL Server integer type.
fn postgres_integer_type(source_type: &str) -> &str {
    match source_type {
        "int" => "integer",
        other => other,
    }
}

/// `ALTER TABLE` statement for the columns whose destination type differs, if any.
///
/// Columns missing from the destination are left alone.
pub fn alter_statement(
    table: &QualifiedTableName,
    source_columns: &[IntegerColumn],
    destination_types: &std::collections::HashMap<String, String>,
) -> Option<String> {
    let clauses: Vec<String> = source_columns
        .iter()
        .filter_map(|column| {
            let wanted = postgres_integer_type(&column.data_type);
            let current = destination_types.get(&column.name)?;

            if current == wanted {
                return None;
            }

            tracing::debug!(
                "{}.{} is {} in the destination but {} in the source",
                table,
                column.name,
                current,
                column.data_type
            );

            let name = quote_ident(&column.name);
            Some(format!(
                "ALTER COLUMN {} TYPE {} USING {}::{}",
                name, wanted, name, wanted
            ))
        })
        .collect();

    if clauses.is_empty() {
        return None;
    }

    Some(format!("ALTER TABLE {} {};", table.to_sql(), clauses.join(", ")))
}

pub struct SchemaAligner<'a> {
    source: &'a dyn SourceWarehouse,
    destination: &'a dyn DestinationDatabase,
    row_id_columns: &'a [String],
    dry_run: bool,
}

impl<'a> SchemaAligner<'a> {
    pub fn new(
        source: &'a dyn SourceWarehouse,
        destination: &'a dyn DestinationDatabase,
        row_id_columns: &'a [String],
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            destination,
            row_id_columns,
            dry_run,
        }
    }

    /// Match the integer column widths of `destination_table` to `source_table`.
    ///
    /// Only meaningful after the table has been imported.
    pub async fn align(
        &self,
        source_table: &QualifiedTableName,
        destination_table: &QualifiedTableName,
    ) -> Result<AlignOutcome> {
        let columns = self
            .source
            .integer_columns(source_table, self.row_id_columns)
            .await?;

        if columns.is_empty() {
            tracing::debug!("Skipping {}: no integer columns", destination_table);
            return Ok(AlignOutcome::Skipped);
        }

        let types = self
            .destination
            .column_types(destination_table)
            .await
            .with_context(|| format!("Failed to read columns of {}", destination_table))?;

        let Some(sql) = alter_statement(destination_table, &columns, &types) else {
            tracing::debug!("Skipping {}: integer columns already match", destination_table);
            return Ok(AlignOutcome::Skipped);
        };

        tracing::debug!("Updating schema for {} with {}", destination_table, sql);

        if self.dry_run {
            tracing::info!("[dry run] would update schema for {}", destination_table);
        } else {
            self.destination
                .execute(&sql)
                .await
                .with_context(|| format!("Failed to update schema for {}", destination_table))?;
            tracing::info!("Updated schema for {}", destination_table);
        }

        Ok(AlignOutcome::Altered(sql))
    }

    /// Align every table the metadata index maps to a destination.
    ///
    /// Failures are recorded per table; the rest still run.
    pub async fn align_all(&self, metadata: &MetadataIndex) -> RunSummary {
        let mut summary = RunSummary::default();

        let mut entries: Vec<_> = metadata.entries().collect();
        entries.sort_by(|a, b| a.source.cmp(&b.source));

        for entry in entries {
            let Some(destination) = entry.destination() else {
                continue;
            };
            self.align_into(&entry.source, &destination, &mut summary)
                .await;
        }

        summary
    }

    /// Align one table and record the outcome.
    pub async fn align_into(
        &self,
        source_table: &QualifiedTableName,
        destination_table: &QualifiedTableName,
        summary: &mut RunSummary,
    ) {
        match self.align(source_table, destination_table).await {
            Ok(AlignOutcome::Altered(_)) => summary.aligned += 1,
            Ok(AlignOutcome::Skipped) => {}
            Err(e) => {
                tracing::warn!("Schema alignment failed for {}: {:#}", destination_table, e);
                summary
                    .failures
                    .push(format!("{}: {:#}", destination_table, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn column(name: &str, data_type: &str) -> IntegerColumn {
        IntegerColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    fn types(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, data_type)| (name.to_string(), data_type.to_string()))
            .collect()
    }

    #[test]
    fn test_differing_columns_batched_into_one_statement() {
        let table = QualifiedTableName::new("water", "lakes");
        let sql = alter_statement(
            &table,
            &[column("depth", "smallint"), column("gnis_id", "int")],
            &types(&[("depth", "integer"), ("gnis_id", "numeric")]),
        )
        .unwrap();

        assert_eq!(
            sql,
            "ALTER TABLE \"water\".\"lakes\" \
             ALTER COLUMN \"depth\" TYPE smallint USING \"depth\"::smallint, \
             ALTER COLUMN \"gnis_id\" TYPE integer USING \"gnis_id\"::integer;"
        );
    }

    #[test]
    fn test_matching_columns_produce_nothing() {
        let table = QualifiedTableName::new("water", "lakes");
        let sql = alter_statement(
            &table,
            &[column("depth", "int"), column("count", "bigint")],
            &types(&[("depth", "integer"), ("count", "bigint")]),
        );
        assert!(sql.is_none());
    }

    #[test]
    fn test_columns_missing_from_destination_are_ignored() {
        let table = QualifiedTableName::new("water", "lakes");
        let sql = alter_statement(&table, &[column("depth", "smallint")], &HashMap::new());
        assert!(sql.is_none());
    }
}
