//! Configuration for the ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Regulatory constants used by the calculator
    pub regulatory: RegulatoryConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/cb-ledger"),
            regulatory: RegulatoryConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Regulatory constants for one reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryConfig {
    /// Target GHG intensity (gCO₂e/MJ)
    pub target_intensity: Decimal,

    /// Energy per tonne of fuel (MJ/t)
    pub energy_conversion_factor: Decimal,
}

impl Default for RegulatoryConfig {
    fn default() -> Self {
        Self {
            target_intensity: Decimal::new(893_368, 4),        // 2% below 91.16
            energy_conversion_factor: Decimal::from(41_000),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CB_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(target) = std::env::var("CB_TARGET_INTENSITY") {
            config.regulatory.target_intensity = parse_decimal("CB_TARGET_INTENSITY", &target)?;
        }

        if let Ok(factor) = std::env::var("CB_ENERGY_CONVERSION_FACTOR") {
            config.regulatory.energy_conversion_factor =
                parse_decimal("CB_ENERGY_CONVERSION_FACTOR", &factor)?;
        }

        Ok(config)
    }
}

fn parse_decimal(var: &str, value: &str) -> crate::Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|e| crate::Error::Config(format!("{} is not a decimal: {}", var, e)))
}
