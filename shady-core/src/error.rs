//! Error types for shady-core.

use std::net::AddrParseError;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed (permission denied, not a file, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (rendering a resolved config).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown preset '{0}'; expected: hot-reload, one-shot")]
    UnknownPreset(String),

    #[error("unknown accept mode '{0}'; expected: persistent, one-shot")]
    UnknownAcceptMode(String),

    #[error("invalid listen address '{value}': {source}")]
    InvalidListenAddr {
        value: String,
        #[source]
        source: AddrParseError,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.shady/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
