use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use taskbit_types::{Amount, LedgerError};

/// Hard cap on the platform fee, admin-settable values included.
pub const MAX_FEE_PERCENT: u8 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub fees: FeeSettings,
    pub limits: LimitSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSettings {
    /// Platform fee percent applied at escrow release.
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    pub min_deposit: u64,
    pub min_withdrawal: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// "memory" or "rocksdb".
    pub backend: String,
    pub data_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fees: FeeSettings { percent: 5 },
            limits: LimitSettings {
                min_deposit: 1_000,
                min_withdrawal: 10_000,
            },
            storage: StorageSettings {
                backend: "memory".to_string(),
                data_dir: PathBuf::from("./data"),
            },
        }
    }
}

impl LedgerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(percent) = env::var("TASKBIT_FEE_PERCENT") {
            if let Ok(value) = percent.parse() {
                self.fees.percent = value;
            }
        }
        if let Ok(min) = env::var("TASKBIT_MIN_DEPOSIT") {
            if let Ok(value) = min.parse() {
                self.limits.min_deposit = value;
            }
        }
        if let Ok(min) = env::var("TASKBIT_MIN_WITHDRAWAL") {
            if let Ok(value) = min.parse() {
                self.limits.min_withdrawal = value;
            }
        }
        if let Ok(backend) = env::var("TASKBIT_STORAGE_BACKEND") {
            if !backend.is_empty() {
                self.storage.backend = backend;
            }
        }
        if let Ok(dir) = env::var("TASKBIT_DATA_DIR") {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Rejects configurations the service would refuse at runtime.
    pub fn validate(&self) -> taskbit_types::Result<()> {
        if self.fees.percent > MAX_FEE_PERCENT {
            return Err(LedgerError::FeeTooHigh {
                maximum: MAX_FEE_PERCENT,
                requested: self.fees.percent,
            });
        }
        Ok(())
    }

    pub fn min_deposit(&self) -> Amount {
        Amount::from_sats(self.limits.min_deposit)
    }

    pub fn min_withdrawal(&self) -> Amount {
        Amount::from_sats(self.limits.min_withdrawal)
    }
}
