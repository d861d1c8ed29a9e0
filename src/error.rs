// ABOUTME: Error taxonomy for catalog reconciliation and sync runs
// ABOUTME: Typed conditions carried inside anyhow so callers can downcast

use thiserror::Error;

/// Conditions the sync engine distinguishes between.
///
/// These travel inside `anyhow::Error`; use `downcast_ref::<SyncError>()` to
/// decide whether a failure is fatal for the run or only for one table.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Source or destination could not be reached. Fatal for the run.
    #[error("failed to connect to {target}: {reason}")]
    ConnectivityFailure { target: String, reason: String },

    /// A qualified identifier did not split into 2 or 3 segments.
    #[error("malformed identifier '{0}': expected schema.table or catalog.schema.table")]
    MalformedIdentifier(String),

    /// The source table has no destination title in the metadata index.
    #[error("{0} has no destination name in the metadata table")]
    UnmappedTable(String),

    /// The transfer engine reported an error for one table.
    #[error("transfer of {table} failed: {reason}")]
    TransferFailure { table: String, reason: String },

    /// A targeted update named a table that is not in the source catalog.
    #[error("requested table '{0}' was not found in the source")]
    RequestedTableNotFound(String),
}

impl SyncError {
    pub fn connectivity(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SyncError::ConnectivityFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal conditions stop the run immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectivityFailure { .. } | SyncError::MalformedIdentifier(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::connectivity("source", "refused").is_fatal());
        assert!(SyncError::MalformedIdentifier("a.b.c.d".to_string()).is_fatal());
        assert!(!SyncError::UnmappedTable("water.lakes".to_string()).is_fatal());
        assert!(!SyncError::RequestedTableNotFound("lakes".to_string()).is_fatal());
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = SyncError::MalformedIdentifier("lakes".to_string()).into();
        let err = err.context("Failed to build metadata index");
        let typed = err.downcast_ref::<SyncError>();
        assert!(matches!(typed, Some(SyncError::MalformedIdentifier(name)) if name == "lakes"));
    }
}
