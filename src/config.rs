use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use config::{Config, Environment};
use serde::Deserialize;

use crate::error::EtlError;

const DEFAULT_CHUNK_SIZE: usize = 10_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Everything a run needs, assembled from `.env`/the process environment via
/// the `config` crate.
#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    pub source_path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub country_map: HashMap<String, String>,
    pub dsn: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl EtlConfig {
    /// Loads configuration from `.env` (if present) plus the process
    /// environment. Expected variables: `SOURCE_PATH`, `CHUNK_SIZE`,
    /// `RUN_ID`, `MAX_RETRIES`, `COUNTRY_MAP` (a JSON object), `DATABASE_URL`.
    pub fn from_env() -> Result<Self, EtlError> {
        let _ = dotenv::dotenv();

        let mut builder = Config::builder()
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE as i64)
            .map_err(|e| EtlError::Setup(e.to_string()))?
            .set_default("max_retries", DEFAULT_MAX_RETRIES as i64)
            .map_err(|e| EtlError::Setup(e.to_string()))?;

        builder = builder
            .add_source(Environment::default().try_parsing(true))
            .map_err(|e| EtlError::Setup(e.to_string()))?;

        let raw = builder
            .build()
            .map_err(|e| EtlError::Setup(format!("config error: {}", e)))?;

        let source_path: PathBuf = raw
            .get_string("source_path")
            .map_err(|_| EtlError::Setup("SOURCE_PATH is required".to_string()))?
            .into();

        let dsn = raw
            .get_string("database_url")
            .or_else(|_| raw.get_string("dsn"))
            .map_err(|_| EtlError::Setup("DATABASE_URL is required".to_string()))?;

        let chunk_size = raw
            .get_int("chunk_size")
            .map_err(|e| EtlError::Setup(e.to_string()))? as usize;

        let max_retries = raw
            .get_int("max_retries")
            .map_err(|e| EtlError::Setup(e.to_string()))? as u32;

        let run_id = raw.get_string("run_id").ok();

        let country_map = raw
            .get_string("country_map")
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        if chunk_size == 0 {
            return Err(EtlError::Setup("chunk_size must be >= 1".to_string()));
        }

        Ok(Self {
            source_path,
            chunk_size,
            run_id,
            max_retries,
            country_map,
            dsn,
        })
    }

    /// Resolves the configured `run_id`, deriving `run_YYYYMMDD_HHMMSS` from
    /// the current UTC wall clock when none was supplied.
    pub fn resolved_run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S")))
    }
}
