//! Engine configuration.

use crate::domain::identity::{CustodyAccount, Height, Principal};
use crate::error::{EscrowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the tranche count of any escrow.
pub const MAX_TRANCHES: u8 = 5;

/// Parameters fixed at engine initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identity holding elevated rights (cancel, resolve, secure withdrawal).
    pub admin: Principal,

    /// Ledger account the engine controls.
    #[serde(default = "default_custody")]
    pub custody: Principal,

    /// Blocks between creation and expiry.
    #[serde(default = "default_duration")]
    pub default_duration: Height,

    /// Blocks after creation before a secure withdrawal is allowed.
    #[serde(default = "default_min_withdrawal_delay")]
    pub min_withdrawal_delay: Height,

    #[serde(default = "default_freeze_min")]
    pub freeze_min: Height,

    #[serde(default = "default_freeze_max")]
    pub freeze_max: Height,

    /// Largest single timeframe extension.
    #[serde(default = "default_max_extension")]
    pub max_extension: Height,

    #[serde(default = "default_max_tranches")]
    pub max_tranches: u8,
}

fn default_custody() -> Principal {
    Principal::from_static("escrow.custody")
}

fn default_duration() -> Height {
    1440
}

fn default_min_withdrawal_delay() -> Height {
    48
}

fn default_freeze_min() -> Height {
    6
}

fn default_freeze_max() -> Height {
    720
}

fn default_max_extension() -> Height {
    1440
}

fn default_max_tranches() -> u8 {
    MAX_TRANCHES
}

impl EngineConfig {
    /// Configuration with every parameter at its default.
    pub fn new(admin: Principal) -> Self {
        Self {
            admin,
            custody: default_custody(),
            default_duration: default_duration(),
            min_withdrawal_delay: default_min_withdrawal_delay(),
            freeze_min: default_freeze_min(),
            freeze_max: default_freeze_max(),
            max_extension: default_max_extension(),
            max_tranches: default_max_tranches(),
        }
    }

    /// Reads a TOML file and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| EscrowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin == self.custody {
            return Err(EscrowError::Config(
                "admin and custody must be different principals".to_string(),
            ));
        }
        if self.default_duration == 0 {
            return Err(EscrowError::Config(
                "default_duration must be positive".to_string(),
            ));
        }
        if self.freeze_min > self.freeze_max {
            return Err(EscrowError::Config(format!(
                "freeze_min ({}) exceeds freeze_max ({})",
                self.freeze_min, self.freeze_max
            )));
        }
        if self.max_extension == 0 {
            return Err(EscrowError::Config(
                "max_extension must be positive".to_string(),
            ));
        }
        if self.max_tranches == 0 || self.max_tranches > MAX_TRANCHES {
            return Err(EscrowError::Config(format!(
                "max_tranches must be within 1..={MAX_TRANCHES}, got {}",
                self.max_tranches
            )));
        }
        Ok(())
    }

    pub fn custody_account(&self) -> CustodyAccount {
        CustodyAccount::new(self.custody.clone())
    }
}
