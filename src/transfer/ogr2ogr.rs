// ABOUTME: Transfer engine backed by the GDAL ogr2ogr command line tool
// ABOUTME: Builds the option list for one table and runs it as a subprocess

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Command;

use super::{TransferEngine, TransferReport, TransferRequest};
use crate::config::{Config, DestinationConnection, SourceConnection};
use crate::error::SyncError;
use crate::utils::{check_required_tool, format_elapsed};

/// GDAL configuration options applied to every run.
const GDAL_CONFIG: &[(&str, &str)] = &[
    ("MSSQLSPATIAL_LIST_ALL_TABLES", "YES"),
    ("PG_LIST_ALL_TABLES", "YES"),
    ("PG_USE_POSTGIS", "YES"),
    ("PG_USE_COPY", "YES"),
];

pub struct Ogr2OgrEngine {
    program: PathBuf,
    source_dsn: String,
    destination_dsn: String,
}

impl Ogr2OgrEngine {
    /// Engine for runs that never transfer: the program is resolved from
    /// PATH only if a transfer is attempted.
    pub fn new(config: &Config) -> Self {
        Self::with_program(
            PathBuf::from(&config.transfer.program),
            &config.source,
            &config.destination,
        )
    }

    /// Locate the program up front and capture both data source names.
    pub fn locate(config: &Config) -> Result<Self> {
        check_required_tool(&config.transfer.program)?;

        let program = which::which(&config.transfer.program)
            .with_context(|| format!("{} not found in PATH", config.transfer.program))?;

        Ok(Self::with_program(
            program,
            &config.source,
            &config.destination,
        ))
    }

    pub fn with_program(
        program: PathBuf,
        source: &SourceConnection,
        destination: &DestinationConnection,
    ) -> Self {
        Self {
            program,
            source_dsn: source.ogr_string(),
            destination_dsn: destination.ogr_string(),
        }
    }

    /// Options for one table, without the data source names.
    pub fn options(request: &TransferRequest) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        for (key, value) in GDAL_CONFIG {
            args.extend(["--config".to_string(), key.to_string(), value.to_string()]);
        }

        args.extend([
            "-f".to_string(),
            "PostgreSQL".to_string(),
            "-dialect".to_string(),
            "OGRSQL".to_string(),
            "-sql".to_string(),
            request.select_sql.clone(),
            "-lco".to_string(),
            "FID=xid".to_string(),
            "-lco".to_string(),
            format!("SCHEMA={}", request.target.schema()),
        ]);

        if request.overwrite {
            args.extend([
                "-overwrite".to_string(),
                "-lco".to_string(),
                "OVERWRITE=YES".to_string(),
            ]);
        }

        args.extend([
            "-lco".to_string(),
            format!("GEOMETRY_NAME={}", request.geometry_column),
            "-lco".to_string(),
            "PRECISION=YES".to_string(),
            "-a_srs".to_string(),
            request.spatial_reference.clone(),
            "-nlt".to_string(),
            request.geometry_type.clone(),
            "-nln".to_string(),
            request.target.table().to_string(),
        ]);

        args
    }
}

#[async_trait]
impl TransferEngine for Ogr2OgrEngine {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReport> {
        let options = Self::options(request);
        tracing::debug!("Running {} {}", self.program.display(), options.join(" "));

        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&options)
            .arg(&self.destination_dsn)
            .arg(&self.source_dsn)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("exited with {}", output.status),
                message => message.to_string(),
            };
            return Err(SyncError::TransferFailure {
                table: request.target.to_string(),
                reason,
            }
            .into());
        }

        let elapsed = start.elapsed();
        tracing::debug!("Completed {} in {}", request.target, format_elapsed(elapsed));

        Ok(TransferReport {
            target: request.target.clone(),
            elapsed,
        })
    }
}
