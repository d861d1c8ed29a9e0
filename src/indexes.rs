// ABOUTME: Index creation for destination tables after they are imported
// ABOUTME: Builds b-tree and trigram indexes from the configured definitions

use crate::config::{IndexDefinition, IndexKind};
use crate::destination::DestinationDatabase;
use crate::names::QualifiedTableName;
use crate::utils::quote_ident;

/// `CREATE INDEX IF NOT EXISTS` statement for one definition.
pub fn index_statement(table: &QualifiedTableName, definition: &IndexDefinition) -> String {
    let column = quote_ident(&definition.column);

    match definition.kind {
        IndexKind::Btree => format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
            quote_ident(&format!("idx_{}_{}", table.table(), definition.column)),
            table.to_sql(),
            column
        ),
        IndexKind::Trigram => format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING gin ({} gin_trgm_ops);",
            quote_ident(&format!("trgm_idx_{}_{}", table.table(), definition.column)),
            table.to_sql(),
            column
        ),
    }
}

/// Creates configured indexes. Failures are logged and never fail the table.
pub struct IndexBuilder<'a> {
    destination: &'a dyn DestinationDatabase,
    definitions: &'a [IndexDefinition],
    dry_run: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(
        destination: &'a dyn DestinationDatabase,
        definitions: &'a [IndexDefinition],
        dry_run: bool,
    ) -> Self {
        Self {
            destination,
            definitions,
            dry_run,
        }
    }

    /// Statements configured for `table`, in definition order.
    pub fn statements_for(&self, table: &QualifiedTableName) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|definition| {
                QualifiedTableName::parse(&definition.table)
                    .map(|name| &name == table)
                    .unwrap_or(false)
            })
            .map(|definition| index_statement(table, definition))
            .collect()
    }

    /// Create the indexes configured for one table. Returns how many succeeded.
    pub async fn create_for(&self, table: &QualifiedTableName) -> usize {
        let statements = self.statements_for(table);
        if statements.is_empty() {
            return 0;
        }

        tracing::debug!("Adding {} indexes to {}", statements.len(), table);

        let mut created = 0;
        for sql in &statements {
            if self.dry_run {
                tracing::info!("[dry run] {}", sql);
                created += 1;
                continue;
            }

            match self.destination.execute(sql).await {
                Ok(()) => created += 1,
                Err(e) => tracing::warn!("Failed running {}: {:#}", sql, e),
            }
        }

        created
    }

    /// Create every configured index. Returns how many succeeded.
    pub async fn create_all(&self) -> usize {
        let mut tables: Vec<QualifiedTableName> = self
            .definitions
            .iter()
            .filter_map(|definition| QualifiedTableName::parse(&definition.table).ok())
            .collect();
        tables.sort();
        tables.dedup();

        let mut created = 0;
        for table in &tables {
            created += self.create_for(table).await;
        }

        tracing::info!("Created {} of {} indexes", created, self.definitions.len());
        created
    }
}
