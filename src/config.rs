use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::rpc::{ArgumentEncoding, ContractKind};

/// Environment variables with this prefix override file values,
/// e.g. `WEATHERD_REPO_PORT=11001`.
pub const ENV_PREFIX: &str = "WEATHERD_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractName {
    #[default]
    Raw,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: IpAddr,
    pub repo_port: u16,
    pub status_port: u16,
    pub channel_info_port: u16,
    pub contract: ContractName,
    /// Only used by the raw contract.
    pub arguments: ArgumentEncoding,
    pub weather_interval_ms: u64,
    pub client_timeout_ms: u64,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            repo_port: 10001,
            status_port: 10002,
            channel_info_port: 10003,
            contract: ContractName::Raw,
            arguments: ArgumentEncoding::Tagged,
            weather_interval_ms: 10_000,
            client_timeout_ms: 5_000,
            simulation: true,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the optional TOML file, `WEATHERD_*` variables and
    /// finally `overrides` (usually CLI flags with unset ones skipped).
    pub fn load<T: Serialize>(path: Option<&Path>, overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.weather_interval_ms == 0 {
            anyhow::bail!("weather_interval_ms must be positive");
        }
        if self.client_timeout_ms == 0 {
            anyhow::bail!("client_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn repo_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.repo_port)
    }

    pub fn status_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.status_port)
    }

    pub fn channel_info_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.channel_info_port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn weather_interval(&self) -> Duration {
        Duration::from_millis(self.weather_interval_ms)
    }

    pub fn contract(&self) -> ContractKind {
        match self.contract {
            ContractName::Raw => ContractKind::Raw(self.arguments),
            ContractName::Json => ContractKind::Json,
        }
    }
}
