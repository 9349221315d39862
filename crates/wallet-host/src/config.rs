//! Host configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bridge_core::{Principal, Tokens, TRANSFER_FEE_E8S};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mainnet ICP ledger canister.
pub const DEFAULT_LEDGER_CANISTER_ID: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Boundary node for a network ledger client. The bundled host runs
    /// against `MemoryLedger` and only validates and reports this value.
    pub ledger_url: String,
    /// Ledger canister a network client would call; reported like `ledger_url`.
    pub ledger_canister_id: String,
    pub transfer_fee_e8s: u64,
    /// Page opened when the browser tab starts.
    pub home_url: String,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            ledger_url: "https://ic0.app".to_string(),
            ledger_canister_id: DEFAULT_LEDGER_CANISTER_ID.to_string(),
            transfer_fee_e8s: TRANSFER_FEE_E8S,
            home_url: "https://google.com".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl HostConfig {
    /// Loads `path`, or the default location when `None`. A missing default
    /// file yields the built-in defaults; environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        debug!(path = %path.display(), "loaded host config");
        Ok(config)
    }

    /// Applies `PACA_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PACA_LEDGER_URL") {
            self.ledger_url = url;
        }
        if let Some(fee) = lookup("PACA_TRANSFER_FEE_E8S") {
            self.transfer_fee_e8s = fee
                .trim()
                .parse()
                .map_err(|e| anyhow!("PACA_TRANSFER_FEE_E8S must be an integer: {}", e))?;
        }
        if let Some(home) = lookup("PACA_HOME_URL") {
            self.home_url = home;
        }
        if let Some(filter) = lookup("PACA_LOG") {
            self.log_filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.ledger_url)
            .map_err(|e| anyhow!("invalid ledger_url {}: {}", self.ledger_url, e))?;
        Principal::from_text(&self.ledger_canister_id)
            .map_err(|e| anyhow!("invalid ledger_canister_id: {}", e))?;
        Ok(())
    }

    pub fn transfer_fee(&self) -> Tokens {
        Tokens::from_e8s(self.transfer_fee_e8s)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let mut path = std::env::var_os("HOME").map(PathBuf::from)?;
    path.push(".paca");
    path.push("config.json");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config_path(suffix: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("paca-config-test-{}-{}.json", std::process::id(), suffix));
        path
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = test_config_path("partial");
        fs::write(&path, r#"{ "home_url": "https://internetcomputer.org" }"#).unwrap();

        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.home_url, "https://internetcomputer.org");
        assert_eq!(config.transfer_fee_e8s, 10_000);
        assert_eq!(config.ledger_canister_id, DEFAULT_LEDGER_CANISTER_ID);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn environment_overrides_win() {
        let overrides: HashMap<&str, &str> = [
            ("PACA_TRANSFER_FEE_E8S", "20000"),
            ("PACA_LOG", "wallet_host=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = HostConfig::default();
        config
            .apply_overrides(|key| overrides.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.transfer_fee(), Tokens::from_e8s(20_000));
        assert_eq!(config.log_filter, "wallet_host=debug");
        assert_eq!(config.ledger_url, "https://ic0.app");
    }

    #[test]
    fn rejects_bad_fee_override() {
        let mut config = HostConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PACA_TRANSFER_FEE_E8S").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PACA_TRANSFER_FEE_E8S"));
    }

    #[test]
    fn validates_canister_id() {
        let config = HostConfig {
            ledger_canister_id: "nope".to_string(),
            ..HostConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(HostConfig::default().validate().is_ok());
    }
}
