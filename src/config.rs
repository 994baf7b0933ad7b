//! Runtime configuration shared by the `web` and `cli` binaries.
//!
//! Every setting can be given as a flag or through its `REGISTRY_*`
//! environment variable (a `.env` file is loaded by the binaries first).

use crate::{
    database::Database,
    memory::MemoryRegistry,
    registry::Registry,
    schema::{SchemaError, SchemaProvider},
    storage::Storage,
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

/// Selects the in-memory registry instead of a database.
pub const MEMORY_DATABASE: &str = "memory";

/// 1 GiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 1 << 30;

#[derive(Debug, Clone, Parser)]
pub struct AppConfig {
    /// SQLite URL of the registry database, or `memory`.
    #[arg(
        long,
        env = "REGISTRY_DATABASE_URL",
        default_value = "sqlite:./registry.db"
    )]
    pub database_url: String,

    /// Address the HTTP server listens on.
    #[arg(long, env = "REGISTRY_BIND", default_value = "0.0.0.0:9292")]
    pub bind: SocketAddr,

    /// Directory holding uploaded image data.
    #[arg(long, env = "REGISTRY_DATA_DIR", default_value = "./images")]
    pub data_dir: PathBuf,

    /// Directory of `<name>.json` schema overrides.
    #[arg(long, env = "REGISTRY_SCHEMA_DIR")]
    pub schema_dir: Option<PathBuf>,

    /// Public base URL used in the versions document, e.g. `http://registry:9292`.
    #[arg(long, env = "REGISTRY_BASE_URL")]
    pub base_url: Option<String>,

    /// Largest image data upload accepted, in bytes. Uploads are buffered in memory.
    #[arg(long, env = "REGISTRY_MAX_UPLOAD_SIZE", default_value_t = DEFAULT_MAX_UPLOAD_SIZE)]
    pub max_upload_size: usize,
}

impl AppConfig {
    /// Opens the configured data store, migrating the database if needed.
    pub async fn open_registry(&self) -> Result<Arc<dyn Registry>, sqlx::Error> {
        if self.database_url == MEMORY_DATABASE {
            tracing::warn!("using the in-memory registry; nothing will be persisted");
            return Ok(Arc::new(MemoryRegistry::new()));
        }

        tracing::info!(url = %self.database_url, "opening registry database");
        let db = Database::connect(&self.database_url).await?;

        Ok(Arc::new(db))
    }

    pub fn schema_provider(&self) -> Result<SchemaProvider, SchemaError> {
        match &self.schema_dir {
            Some(dir) => SchemaProvider::with_overrides(dir),
            None => SchemaProvider::new(),
        }
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.data_dir.clone())
    }

    /// Base URL for absolute links, falling back to the bind address.
    pub fn public_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind),
        }
    }
}
