//! shady core library: configuration presets, config files, errors.
//!
//! - [`config`]: [`ServerConfig`], [`Preset`], layered resolution
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;

pub use config::{AcceptMode, ConfigLayer, Preset, ServerConfig};
pub use error::ConfigError;
