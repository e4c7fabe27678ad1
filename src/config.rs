use anyhow::{Context, Result, bail};
use serde::{Deserialize, de::DeserializeOwned};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio_tungstenite::tungstenite::http::Uri;

pub const DEFAULT_LOCAL_CONFIG: &str = "config.local.toml";
pub const DEFAULT_REMOTE_CONFIG: &str = "config.remote.toml";
pub const DEFAULT_WS_PATH: &str = "/mysql";

/// Settings for the bridge that accepts plain TCP and dials out over WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    pub local_listen_address: String,
    pub server_ws_url: String,
    pub log_path: PathBuf,
    #[serde(default)]
    pub dial_timeout_secs: Option<u64>,
}

/// Settings for the bridge that accepts WebSocket upgrades and dials the TCP target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub listen_address: String,
    pub mysql_server_address: String,
    pub log_path: PathBuf,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default)]
    pub dial_timeout_secs: Option<u64>,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

impl LocalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = read_toml(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse local bridge config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn dial_timeout(&self) -> Option<Duration> {
        self.dial_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        require_address("local_listen_address", &self.local_listen_address)?;
        validate_ws_url(&self.server_ws_url)?;
        validate_timeout(self.dial_timeout_secs)
    }
}

impl RemoteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = read_toml(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Failed to parse remote bridge config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn dial_timeout(&self) -> Option<Duration> {
        self.dial_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        require_address("listen_address", &self.listen_address)?;
        require_address("mysql_server_address", &self.mysql_server_address)?;
        if !self.ws_path.starts_with('/') {
            bail!("ws_path must start with '/', got {:?}", self.ws_path);
        }
        validate_timeout(self.dial_timeout_secs)
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse {} as valid TOML", path.display()))
}

fn require_address(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(())
}

fn validate_ws_url(url: &str) -> Result<()> {
    let uri: Uri = url
        .parse()
        .with_context(|| format!("server_ws_url is not a valid URL: {url}"))?;
    match uri.scheme_str() {
        Some("ws" | "wss") => {}
        other => bail!("server_ws_url must use ws:// or wss://, got scheme {other:?}"),
    }
    if uri.host().is_none() {
        bail!("server_ws_url has no host: {url}");
    }
    Ok(())
}

fn validate_timeout(secs: Option<u64>) -> Result<()> {
    if secs == Some(0) {
        bail!("dial_timeout_secs must be greater than zero");
    }
    Ok(())
}
