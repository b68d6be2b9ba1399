//! Environment configuration shared by the ingest and api binaries.
//!
//! Values come from the process environment (after `.env` is loaded by the
//! caller). Command-line flags, where a binary has them, win over these.

use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REGISTRY_FILE: &str = "data/MOD List.xlsx";
pub const DEFAULT_MAPPING_FILE: &str = "plant_mappings.json";
pub const DEFAULT_DB_URL: &str = "sqlite://database.db";
pub const DEFAULT_API_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub registry_file: PathBuf,
    pub mapping_file: PathBuf,
    pub db_url: String,
    pub api_bind: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            data_dir: PathBuf::from(get("DATA_DIR", DEFAULT_DATA_DIR)),
            registry_file: PathBuf::from(get("REGISTRY_FILE", DEFAULT_REGISTRY_FILE)),
            mapping_file: PathBuf::from(get("MAPPING_FILE", DEFAULT_MAPPING_FILE)),
            db_url: get("DB_URL", DEFAULT_DB_URL),
            api_bind: get("API_BIND", DEFAULT_API_BIND),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
