//! Configuration for pooling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pooling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Largest pool accepted
    pub max_members: usize,

    /// How caller-supplied balances are treated
    pub snapshot_policy: SnapshotPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_members: 100,
            snapshot_policy: SnapshotPolicy::RejectStale,
        }
    }
}

/// Handling of `cb_before` values sent by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Re-read each balance under lock, fail if any supplied value differs
    #[default]
    RejectStale,

    /// Ignore supplied values and pool the balances read under lock
    UseLive,
}

impl fmt::Display for SnapshotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotPolicy::RejectStale => write!(f, "reject_stale"),
            SnapshotPolicy::UseLive => write!(f, "use_live"),
        }
    }
}

impl FromStr for SnapshotPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject_stale" => Ok(SnapshotPolicy::RejectStale),
            "use_live" => Ok(SnapshotPolicy::UseLive),
            other => Err(crate::Error::Config(format!(
                "Unknown snapshot policy: {}",
                other
            ))),
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
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(max) = std::env::var("CB_POOL_MAX_MEMBERS") {
            config.max_members = max.trim().parse().map_err(|e| {
                crate::Error::Config(format!("CB_POOL_MAX_MEMBERS is not a number: {}", e))
            })?;
        }

        if let Ok(policy) = std::env::var("CB_POOL_SNAPSHOT_POLICY") {
            config.snapshot_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.max_members < 2 {
            return Err(crate::Error::Config(format!(
                "max_members must be at least 2, got {}",
                self.max_members
            )));
        }
        Ok(())
    }
}
