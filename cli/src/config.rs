use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::card::storage::write_json;
use crate::card::ConnectionProfile;

const CONFIG_FILE: &str = "config.json";

/// Wallet settings kept in `config.json` under the wallet home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    /// Only load cards bound to the local `web` profile.
    #[serde(default)]
    pub local_only: bool,
    /// Profile used for new cards when none is given.
    #[serde(default)]
    pub default_profile: ConnectionProfile,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            local_only: false,
            default_profile: ConnectionProfile::default(),
        }
    }
}

impl WalletConfig {
    pub fn read_or_create(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        if path.exists() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read wallet config at {}", path.display()))?;
            let cfg: WalletConfig =
                serde_json::from_str(&data).context("wallet config is not valid JSON")?;
            return Ok(cfg);
        }

        let cfg = Self::default();
        write_json(&path, &cfg)?;
        info!("created default wallet config at {}", path.display());
        Ok(cfg)
    }
}
