use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

pub const CONFIG_PATH_VAR: &str = "NEXTID_BINDER_CONFIG";
pub const CONFIG_ENV_VAR: &str = "NEXTID_BINDER_ENV";
pub const BASE_URL_VAR: &str = "PROOF_SERVICE_BASE_URL";
pub const WALLET_KEY_VAR: &str = "NEXTID_WALLET_PRIVATE_KEY";
pub const PORT_VAR: &str = "NEXTID_BINDER_PORT";

const DEFAULT_CONFIG_PATH: &str = "config/binder.toml";
const DEFAULT_PORT: u16 = 8787;
const DEFAULT_NETWORK: &str = "polygon-mumbai";

#[derive(Debug, Clone, Deserialize)]
pub struct BinderConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proof_service: ProofServiceConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

impl BinderConfig {
    /// Loads file config (optional) then applies environment overrides.
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(false));

        if let Ok(env_override) = std::env::var(CONFIG_ENV_VAR)
            && !env_override.is_empty()
        {
            let env_file = format!("config/binder.{env_override}.toml");
            if Path::new(&env_file).exists() {
                builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize binder configuration")?;

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .context("Failed to parse binder configuration")?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize binder configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(BASE_URL_VAR) {
            self.proof_service.base_url = Some(url);
        }
        if let Some(key) = lookup(WALLET_KEY_VAR) {
            self.wallet.private_key = Some(key);
        }
        if let Some(port) = lookup(PORT_VAR) {
            self.server.port = port
                .parse()
                .with_context(|| format!("{PORT_VAR} must be a port number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than zero"));
        }
        self.proof_service.ensure_bounds()?;
        if self.wallet.network.trim().is_empty() {
            return Err(anyhow!("Wallet network must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }

    const fn default_port() -> u16 {
        DEFAULT_PORT
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProofServiceConfig {
    /// Absent is allowed here; every proof call then fails with
    /// `ConfigMissing` before touching the network.
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl ProofServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "Request timeout must be at least 100ms");
        assert!(millis <= 120_000, "Request timeout cannot exceed 120 seconds");
        Duration::from_millis(millis)
    }

    pub fn base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }

    fn ensure_bounds(&self) -> Result<()> {
        if let Some(millis) = self.request_timeout_ms
            && !(100..=120_000).contains(&millis)
        {
            return Err(anyhow!(
                "Request timeout must be between 100ms and 120s, got {millis}ms"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: Option<String>,
    #[serde(default = "WalletConfig::default_network")]
    pub network: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            network: DEFAULT_NETWORK.to_string(),
        }
    }
}

impl WalletConfig {
    fn default_network() -> String {
        DEFAULT_NETWORK.to_string()
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = BinderConfig::from_toml("").expect("defaults load");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(
            config.server.address(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT)
        );
        assert!(config.proof_service.base_url().is_none());
        assert_eq!(
            config.proof_service.request_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(config.wallet.network, DEFAULT_NETWORK);
        assert!(config.wallet.private_key.is_none());
    }

    #[test]
    fn file_values_are_read() {
        let config = BinderConfig::from_toml(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [proof_service]
            base_url = "https://proof-service.next.id"
            request_timeout_ms = 2500

            [wallet]
            network = "polygon"
            "#,
        )
        .expect("config parses");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.proof_service.base_url().as_deref(),
            Some("https://proof-service.next.id")
        );
        assert_eq!(
            config.proof_service.request_timeout(),
            Duration::from_millis(2500)
        );
        assert_eq!(config.wallet.network, "polygon");
    }

    #[test]
    fn blank_base_url_counts_as_missing() {
        let config = BinderConfig::from_toml(
            r#"
            [proof_service]
            base_url = "   "
            "#,
        )
        .unwrap();
        assert!(config.proof_service.base_url().is_none());
    }

    #[test]
    fn out_of_bounds_values_are_rejected() {
        assert!(BinderConfig::from_toml("[server]\nport = 0").is_err());
        assert!(BinderConfig::from_toml("[proof_service]\nrequest_timeout_ms = 5").is_err());
        assert!(BinderConfig::from_toml("[wallet]\nnetwork = \"\"").is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = BinderConfig::from_toml(
            r#"
            [proof_service]
            base_url = "https://from-file.test"
            "#,
        )
        .unwrap();
        config
            .apply_env(|name| match name {
                BASE_URL_VAR => Some("https://from-env.test".to_string()),
                PORT_VAR => Some("9100".to_string()),
                WALLET_KEY_VAR => Some("0x01".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            config.proof_service.base_url().as_deref(),
            Some("https://from-env.test")
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.wallet.private_key.as_deref(), Some("0x01"));

        let err = config
            .apply_env(|name| (name == PORT_VAR).then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(PORT_VAR));
    }
}
