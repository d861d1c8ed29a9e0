// ABOUTME: Run configuration: connections, schema lists, naming rules and stores
// ABOUTME: Loaded once from TOML at startup and threaded through every component

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::utils::validate_postgres_identifier;

const DEFAULT_CONFIG_FILE: &str = "catalog-sync.toml";

/// Schemas that exist in the destination, one per ISO category.
const DEFAULT_SCHEMAS: &[&str] = &[
    "bioscience",
    "boundaries",
    "cadastre",
    "climate",
    "demographic",
    "economy",
    "elevation",
    "energy",
    "environment",
    "farming",
    "geoscience",
    "health",
    "history",
    "indices",
    "location",
    "planning",
    "political",
    "raster",
    "recreation",
    "society",
    "transportation",
    "utilities",
    "water",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConnection,
    pub destination: DestinationConnection,
    /// Destination schemas the sync manages; tables elsewhere are never listed.
    pub schemas: Vec<String>,
    /// Administrative schemas skipped whenever a catalog is enumerated.
    pub exclude_schemas: Vec<String>,
    /// Columns never copied by the transfer engine.
    pub exclude_fields: Vec<String>,
    /// Internal row-id columns ignored by schema alignment.
    pub row_id_columns: Vec<String>,
    /// Leading word stripped from titles when naming destination tables.
    pub region_word: String,
    pub spatial_reference: String,
    pub geometry_column: String,
    pub metadata_table: String,
    pub change_log_table: String,
    pub transfer: TransferSettings,
    pub watermark: WatermarkConfig,
    pub indexes: Vec<IndexDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConnection::default(),
            destination: DestinationConnection::default(),
            schemas: DEFAULT_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            exclude_schemas: vec!["sde".to_string(), "meta".to_string()],
            exclude_fields: vec![
                "objectid".to_string(),
                "fid".to_string(),
                "gdb_geomattr_data".to_string(),
            ],
            row_id_columns: vec!["objectid".to_string(), "objectid_1".to_string()],
            region_word: "utah".to_string(),
            spatial_reference: "EPSG:26912".to_string(),
            geometry_column: "shape".to_string(),
            metadata_table: "SGID.META.AGOLITEMS".to_string(),
            change_log_table: "SGID.META.CHANGEDETECTION".to_string(),
            transfer: TransferSettings::default(),
            watermark: WatermarkConfig::default(),
            indexes: default_indexes(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// Without an explicit path, `./catalog-sync.toml` is tried first, then
    /// `<config dir>/catalog-sync/config.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or_else(|| {
                anyhow::anyhow!(
                    "No configuration file found. Create {} or pass --config",
                    DEFAULT_CONFIG_FILE
                )
            })?,
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse configuration from {:?}", path))?;

        tracing::debug!("Loaded configuration from {:?}", path);

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        let user = dirs::config_dir()?.join("catalog-sync").join("config.toml");
        user.exists().then_some(user)
    }

    /// Apply password overrides from the command line or environment.
    pub fn with_secrets(
        mut self,
        source_password: Option<String>,
        destination_password: Option<String>,
    ) -> Self {
        if let Some(password) = source_password {
            self.source.password = password;
        }
        if let Some(password) = destination_password {
            self.destination.password = password;
        }
        self
    }

    fn normalize(&mut self) {
        for list in [
            &mut self.schemas,
            &mut self.exclude_schemas,
            &mut self.exclude_fields,
            &mut self.row_id_columns,
        ] {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.host.trim().is_empty() {
            bail!("source.host must be set");
        }
        if self.destination.host.trim().is_empty() {
            bail!("destination.host must be set");
        }

        for schema in &self.schemas {
            validate_postgres_identifier(schema)
                .with_context(|| format!("Invalid schema name in configuration: {}", schema))?;
        }
        validate_postgres_identifier(&self.geometry_column)
            .context("Invalid geometry_column in configuration")?;

        for index in &self.indexes {
            crate::names::QualifiedTableName::parse(&index.table)
                .with_context(|| format!("Invalid index table: {}", index.table))?;
            validate_postgres_identifier(&index.column)
                .with_context(|| format!("Invalid index column: {}", index.column))?;
        }

        Ok(())
    }
}

/// Connection parameters for the SQL Server warehouse.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConnection {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub trust_server_certificate: bool,
    /// ODBC driver named in the connection string handed to the transfer engine.
    pub odbc_driver: String,
}

impl Default for SourceConnection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1433,
            database: "SGID".to_string(),
            user: "internal".to_string(),
            password: String::new(),
            trust_server_certificate: true,
            odbc_driver: "ODBC Driver 17 for SQL Server".to_string(),
        }
    }
}

impl SourceConnection {
    /// ADO.NET style string for the native client.
    pub fn ado_string(&self) -> String {
        format!(
            "server=tcp:{},{};database={};user id={};password={};TrustServerCertificate={}",
            self.host,
            self.port,
            ado_value(&self.database),
            ado_value(&self.user),
            ado_value(&self.password),
            self.trust_server_certificate
        )
    }

    /// OGR data source name for the transfer engine.
    pub fn ogr_string(&self) -> String {
        format!(
            "MSSQL:driver={};server={},{};database={};UID={};PWD={};trusted_connection=no;",
            self.odbc_driver, self.host, self.port, self.database, self.user, self.password
        )
    }

    /// Credential-free identity of this connection.
    pub fn connection_key(&self) -> String {
        format!(
            "mssql://{}@{}:{}/{}",
            self.user,
            self.host.to_lowercase(),
            self.port,
            self.database
        )
    }
}

/// Connection parameters for the PostGIS destination.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DestinationConnection {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DestinationConnection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            database: "opensgid".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl DestinationConnection {
    /// libpq key/value connection string.
    pub fn conninfo(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            conninfo_value(&self.host),
            self.port,
            conninfo_value(&self.user),
            conninfo_value(&self.password),
            conninfo_value(&self.database)
        )
    }

    pub fn ogr_string(&self) -> String {
        format!("PG:{}", self.conninfo())
    }

    pub fn connection_key(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user,
            self.host.to_lowercase(),
            self.port,
            self.database
        )
    }
}

/// Quote a libpq connection value, escaping backslashes and quotes.
fn conninfo_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// ADO values containing separators are wrapped in braces.
fn ado_value(value: &str) -> String {
    if value.contains(';') || value.contains('=') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// GDAL vector translation program.
    pub program: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            program: "ogr2ogr".to_string(),
        }
    }
}

/// Where the change-detection watermark lives.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WatermarkConfig {
    File { path: PathBuf },
    S3 { bucket: String, key: String },
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        WatermarkConfig::File {
            path: PathBuf::from(".last_checked"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Btree,
    Trigram,
}

/// An index created on a destination table after it is imported.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IndexDefinition {
    /// Destination table as `schema.table`.
    pub table: String,
    pub column: String,
    pub kind: IndexKind,
}

fn default_indexes() -> Vec<IndexDefinition> {
    let searchable = [
        ("location.address_points", "fulladd"),
        ("location.zoom_locations", "name"),
        ("location.gnis_place_names", "name"),
        ("transportation.roads", "fullname"),
    ];

    let mut indexes = Vec::new();
    for (table, column) in searchable {
        for kind in [IndexKind::Btree, IndexKind::Trigram] {
            indexes.push(IndexDefinition {
                table: table.to_string(),
                column: column.to_string(),
                kind,
            });
        }
    }

    for column in ["admin", "owner"] {
        indexes.push(IndexDefinition {
            table: "cadastre.land_ownership".to_string(),
            column: column.to_string(),
            kind: IndexKind::Btree,
        });
    }

    indexes
}
