//! Server configuration.
//!
//! # Resolution
//!
//! A [`ServerConfig`] is built from an ordered list of [`ConfigLayer`]s:
//!
//! ```text
//! preset defaults  <  ~/.shady/config.yaml (or --config FILE)  <  CLI flags
//! ```
//!
//! The last layer naming a `preset` picks the base defaults; every other
//! field set in a later layer overrides the same field from an earlier one.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_DIR: &str = ".shady";
pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Accept mode
// ---------------------------------------------------------------------------

/// How the listener hands out the Active Connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptMode {
    /// Accept forever; each new client supersedes and closes the previous one.
    #[default]
    Persistent,
    /// Accept exactly one client, then stop listening.
    OneShot,
}

impl fmt::Display for AcceptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptMode::Persistent => f.write_str("persistent"),
            AcceptMode::OneShot => f.write_str("one-shot"),
        }
    }
}

impl FromStr for AcceptMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persistent" => Ok(Self::Persistent),
            "one-shot" | "oneshot" => Ok(Self::OneShot),
            other => Err(ConfigError::UnknownAcceptMode(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Named deployment targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Shader hot-reload server: port 43957, persistent reconnect loop.
    #[default]
    HotReload,
    /// Single-client server: port 8080, one accept.
    OneShot,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::HotReload, Preset::OneShot];

    pub fn port(self) -> u16 {
        match self {
            Preset::HotReload => 43957,
            Preset::OneShot => 8080,
        }
    }

    /// Default configuration for this preset. Listens on all interfaces.
    pub fn config(self) -> ServerConfig {
        let (watch_dir, accept) = match self {
            Preset::HotReload => (PathBuf::from("shaders"), AcceptMode::Persistent),
            Preset::OneShot => (PathBuf::from("."), AcceptMode::OneShot),
        };
        ServerConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], self.port())),
            watch_dir,
            accept,
            recursive: false,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::HotReload => f.write_str("hot-reload"),
            Preset::OneShot => f.write_str("one-shot"),
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot-reload" | "hotreload" => Ok(Self::HotReload),
            "one-shot" | "oneshot" => Ok(Self::OneShot),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub listen: SocketAddr,
    #[serde(rename = "watch")]
    pub watch_dir: PathBuf,
    pub accept: AcceptMode,
    pub recursive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}

impl ServerConfig {
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// One partial source of configuration: a config file or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<AcceptMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
}

impl ConfigLayer {
    fn apply(&self, config: &mut ServerConfig) -> Result<(), ConfigError> {
        if let Some(listen) = &self.listen {
            config.listen = parse_listen(listen)?;
        }
        if let Some(watch) = &self.watch {
            config.watch_dir = watch.clone();
        }
        if let Some(accept) = self.accept {
            config.accept = accept;
        }
        if let Some(recursive) = self.recursive {
            config.recursive = recursive;
        }
        Ok(())
    }
}

/// Resolve layers (lowest precedence first) into a [`ServerConfig`].
pub fn resolve(layers: &[ConfigLayer]) -> Result<ServerConfig, ConfigError> {
    let preset = layers
        .iter()
        .rev()
        .find_map(|layer| layer.preset)
        .unwrap_or_default();

    let mut config = preset.config();
    for layer in layers {
        layer.apply(&mut config)?;
    }
    Ok(config)
}

/// Parse a listen address. A bare port (`"43957"`) binds all interfaces.
pub fn parse_listen(value: &str) -> Result<SocketAddr, ConfigError> {
    let trimmed = value.trim();
    if let Ok(port) = trimmed.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    let normalized = match trimmed.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => trimmed.to_string(),
    };
    normalized
        .parse::<SocketAddr>()
        .map_err(|source| ConfigError::InvalidListenAddr {
            value: value.to_string(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// `<home>/.shady/config.yaml`, pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load one layer from a YAML file. An empty file is an empty layer.
pub fn load_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(ConfigLayer::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `<home>/.shady/config.yaml` if it exists.
pub fn load_default_layer_at(home: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(None);
    }
    load_layer(&path).map(Some)
}

/// Load `~/.shady/config.yaml` if it exists (convenience, uses `dirs::home_dir()`).
pub fn load_default_layer() -> Result<Option<ConfigLayer>, ConfigError> {
    load_default_layer_at(&home()?)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
