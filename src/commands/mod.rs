// ABOUTME: Command implementations for each sync operation
// ABOUTME: Exports import, trim, update, update-schema, create-indexes and scheduled

pub mod create_indexes;
pub mod import;
pub mod scheduled;
pub mod trim;
pub mod update;
pub mod update_schema;

pub use create_indexes::create_indexes;
pub use import::{import, ImportOptions};
pub use scheduled::scheduled;
pub use trim::trim;
pub use update::{update, UpdateOptions};
pub use update_schema::update_schema;

use crate::config::Config;
use crate::destination::DestinationDatabase;
use crate::names::NameMapper;
use crate::source::SourceWarehouse;
use crate::transfer::TransferEngine;

/// Connections and settings shared by every command in one run.
pub struct SyncContext<'a> {
    pub config: &'a Config,
    pub source: &'a dyn SourceWarehouse,
    pub destination: &'a dyn DestinationDatabase,
    pub transfer: &'a dyn TransferEngine,
    pub names: NameMapper,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn SourceWarehouse,
        destination: &'a dyn DestinationDatabase,
        transfer: &'a dyn TransferEngine,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            transfer,
            names: NameMapper::new(&config.region_word),
        }
    }
}
