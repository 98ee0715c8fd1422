//! Loading of `monitors.toml` and the daemon's runtime settings.
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::monitor::{
    DEFAULT_PROBE_TIMEOUT, EngineSettings, ProbeKind, Target, interval_or_default, parse_interval,
};
use crate::monitor::target::{DEFAULT_EXPECT_STATUS, DEFAULT_HTTP_METHOD};

pub const DEFAULT_CONFIG_PATH: &str = "monitors.toml";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid monitor configuration: {0}")]
    Invalid(String),
}

/// Root of `monitors.toml`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GlobalConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval: String,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
    #[serde(default)]
    pub icmp: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            history_days: default_history_days(),
            probe_timeout: default_probe_timeout(),
            icmp: false,
        }
    }
}

fn default_check_interval() -> String {
    "60s".to_string()
}

fn default_history_days() -> u32 {
    90
}

fn default_probe_timeout() -> String {
    "10s".to_string()
}

/// One `[[notifications]]` entry, kept flat so that incomplete or unknown
/// channels can be skipped instead of failing the whole file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NotificationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub webhook_url: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub body_template: Option<String>,
}

/// One `[[monitors]]` entry.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MonitorConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub method: Option<String>,
    pub expect_status: Option<u16>,
    pub interval: Option<String>,
}

impl MonitorConfig {
    /// Resolves the monitor into a [`Target`], inferring the type when unset:
    /// `url` means http, `host` + `port` means tcp, a lone `host` means icmp.
    pub fn to_target(&self) -> Result<Target, ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid("monitor name must not be empty".into()));
        }
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty());
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty());

        let declared = self
            .kind
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());

        let kind = match declared.as_deref() {
            Some("http" | "https") => {
                let url = url.ok_or_else(|| missing(name, "http", "url"))?;
                self.http_kind(url)
            }
            Some("tcp") => {
                let host = host.ok_or_else(|| missing(name, "tcp", "host"))?;
                let port = self.port.ok_or_else(|| missing(name, "tcp", "port"))?;
                ProbeKind::Tcp {
                    host: host.to_string(),
                    port,
                }
            }
            Some("icmp" | "ping") => {
                let host = host.ok_or_else(|| missing(name, "icmp", "host"))?;
                ProbeKind::Icmp {
                    host: host.to_string(),
                }
            }
            Some(other) => {
                warn!(monitor = %name, kind = %other, "Unrecognised monitor type.");
                match url {
                    Some(url) => self.http_kind(url),
                    None => ProbeKind::Unknown { url: None },
                }
            }
            None => match (url, host, self.port) {
                (Some(url), _, _) => self.http_kind(url),
                (None, Some(host), Some(port)) => ProbeKind::Tcp {
                    host: host.to_string(),
                    port,
                },
                (None, Some(host), None) => ProbeKind::Icmp {
                    host: host.to_string(),
                },
                (None, None, _) => ProbeKind::Unknown { url: None },
            },
        };

        Ok(Target {
            name: name.to_string(),
            kind,
            interval: self.interval.clone().filter(|i| !i.trim().is_empty()),
        })
    }

    fn http_kind(&self, url: &str) -> ProbeKind {
        ProbeKind::Http {
            url: url.to_string(),
            method: self
                .method
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_HTTP_METHOD)
                .to_uppercase(),
            expect_status: self
                .expect_status
                .filter(|status| *status != 0)
                .unwrap_or(DEFAULT_EXPECT_STATUS),
        }
    }
}

fn missing(name: &str, kind: &str, field: &str) -> ConfigError {
    ConfigError::Invalid(format!("{kind} monitor '{name}' requires '{field}'"))
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        info!(path = %path.display(), monitors = config.monitors.len(), "Loaded monitor configuration.");
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.targets()?;
        Ok(config)
    }

    /// Resolved targets, rejecting empty and duplicate names.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        let mut seen = HashSet::new();
        self.monitors
            .iter()
            .map(|monitor| {
                let target = monitor.to_target()?;
                if !seen.insert(target.name.clone()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate monitor name '{}'",
                        target.name
                    )));
                }
                Ok(target)
            })
            .collect()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let probe_timeout = match parse_interval(&self.global.probe_timeout) {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => {
                warn!(probe_timeout = %self.global.probe_timeout, "Unusable probe timeout, using default.");
                DEFAULT_PROBE_TIMEOUT
            }
        };
        EngineSettings {
            default_interval: interval_or_default(&self.global.check_interval),
            probe_timeout,
            icmp: self.global.icmp,
        }
    }
}

/// Process-level settings layered as CLI flag, then environment, then default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub config_path: PathBuf,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl DaemonSettings {
    pub fn resolve(
        cli_config: Option<PathBuf>,
        cli_port: Option<u16>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = cli_config
            .or_else(|| env("CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let port = match cli_port {
            Some(port) => port,
            None => match env("PORT") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {raw}")))?,
                None => DEFAULT_PORT,
            },
        };

        Ok(Self {
            config_path,
            port,
            data_dir: env("DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            log_dir: env("LOG_DIR").map_or_else(|| PathBuf::from("logs"), PathBuf::from),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("uptimed.db")
    }
}
