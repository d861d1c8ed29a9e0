// ABOUTME: Change detection: watermark persistence and changed-table discovery
// ABOUTME: Finds source tables modified since the last successful run

pub mod file;
pub mod s3;
pub mod store;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::config::WatermarkConfig;
use crate::names::{NameMapper, QualifiedTableName};
use crate::source::SourceWarehouse;

pub use file::FileWatermarkStore;
pub use s3::S3WatermarkStore;
pub use store::WatermarkStore;

const WATERMARK_FORMAT: &str = "%Y-%m-%d";

/// Today's date in local time, the unit the watermark is kept in.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Build the store selected in configuration.
pub async fn open_store(config: &WatermarkConfig) -> Result<Box<dyn WatermarkStore>> {
    match config {
        WatermarkConfig::File { path } => Ok(Box::new(FileWatermarkStore::new(path.clone()))),
        WatermarkConfig::S3 { bucket, key } => {
            Ok(Box::new(S3WatermarkStore::new(bucket, key).await?))
        }
    }
}

/// The date changes are looked for from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeWatermark {
    pub date: NaiveDate,
    /// No watermark was stored; the run only establishes a baseline.
    pub first_run: bool,
}

pub struct ChangeDetectionTracker {
    store: Box<dyn WatermarkStore>,
    names: NameMapper,
}

impl ChangeDetectionTracker {
    pub fn new(store: Box<dyn WatermarkStore>, names: NameMapper) -> Self {
        Self { store, names }
    }

    /// Read the stored watermark.
    ///
    /// A missing or empty blob means this is the first run: the watermark
    /// defaults to today and nothing is reported as changed.
    pub async fn read_watermark(&self) -> Result<ChangeWatermark> {
        let contents = self.store.read().await?;

        let stored = contents
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match stored {
            Some(value) => {
                let date = NaiveDate::parse_from_str(value, WATERMARK_FORMAT).with_context(|| {
                    format!(
                        "Invalid watermark '{}' in {}: expected YYYY-MM-DD",
                        value,
                        self.store.location()
                    )
                })?;
                tracing::info!("Checking for changes since {}", date);
                Ok(ChangeWatermark {
                    date,
                    first_run: false,
                })
            }
            None => {
                let date = today();
                tracing::info!(
                    "No watermark found in {}; starting from {}",
                    self.store.location(),
                    date
                );
                Ok(ChangeWatermark {
                    date,
                    first_run: true,
                })
            }
        }
    }

    /// Source tables changed on or after the watermark, de-duplicated in the
    /// order the change log reports them.
    pub async fn tables_changed_since(
        &self,
        source: &dyn SourceWarehouse,
        watermark: &ChangeWatermark,
    ) -> Result<Vec<QualifiedTableName>> {
        if watermark.first_run {
            tracing::info!("First change detection run; establishing a baseline");
            return Ok(Vec::new());
        }

        let raw = source
            .changed_tables(watermark.date)
            .await
            .context("Failed to query the change log")?;

        let mut changed: Vec<QualifiedTableName> = Vec::new();
        for identifier in raw {
            let name = self.names.split(&identifier)?;
            if !changed.contains(&name) {
                changed.push(name);
            }
        }

        tracing::info!(
            "{} tables changed since {}",
            changed.len(),
            watermark.date
        );

        Ok(changed)
    }

    /// Persist `date` as the new watermark.
    ///
    /// The watermark never moves backwards; an older date leaves the stored
    /// value in place. Returns the date that is stored afterwards.
    pub async fn write_watermark(&self, date: NaiveDate) -> Result<NaiveDate> {
        let current = self.read_watermark().await?;

        if !current.first_run && date < current.date {
            tracing::warn!(
                "Not moving the watermark back from {} to {}",
                current.date,
                date
            );
            return Ok(current.date);
        }

        self.store
            .write(&date.format(WATERMARK_FORMAT).to_string())
            .await?;

        tracing::info!("Watermark in {} set to {}", self.store.location(), date);
        Ok(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> ChangeDetectionTracker {
        ChangeDetectionTracker::new(
            Box::new(FileWatermarkStore::new(dir.path().join(".last_checked"))),
            NameMapper::default(),
        )
    }

    #[tokio::test]
    async fn test_absent_watermark_is_first_run() {
        let dir = TempDir::new().unwrap();
        let watermark = tracker(&dir).read_watermark().await.unwrap();
        assert!(watermark.first_run);
        assert_eq!(watermark.date, today());
    }

    #[tokio::test]
    async fn test_reads_stored_date_with_trailing_newline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".last_checked"), "2024-01-15\n").unwrap();

        let watermark = tracker(&dir).read_watermark().await.unwrap();
        assert!(!watermark.first_run);
        assert_eq!(watermark.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[tokio::test]
    async fn test_garbage_watermark_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".last_checked"), "last tuesday").unwrap();

        let err = tracker(&dir).read_watermark().await.unwrap_err();
        assert!(err.to_string().contains("Invalid watermark"));
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let later = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(tracker.write_watermark(later).await.unwrap(), later);
        assert_eq!(tracker.write_watermark(earlier).await.unwrap(), later);
        assert_eq!(tracker.read_watermark().await.unwrap().date, later);
    }
}
