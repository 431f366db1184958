pub mod config;
pub mod greet;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use shady_core::{config as core_config, AcceptMode, ConfigLayer, Preset, ServerConfig};

/// Flags shared by `serve` and `config`; they override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Deployment preset: hot-reload (port 43957) or one-shot (port 8080).
    #[arg(long)]
    pub preset: Option<Preset>,

    /// YAML config file. Defaults to ~/.shady/config.yaml when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:43957, :8080 or a bare port.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Directory to watch for modified files.
    #[arg(long, value_name = "DIR")]
    pub watch: Option<PathBuf>,

    /// Connection strategy: persistent or one-shot.
    #[arg(long)]
    pub accept: Option<AcceptMode>,

    /// Also watch subdirectories.
    #[arg(long)]
    pub recursive: bool,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<ServerConfig> {
        let mut layers = Vec::new();

        let file_layer = match &self.config {
            Some(path) => Some(
                core_config::load_layer(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
            ),
            None => core_config::load_default_layer()
                .context("failed to load ~/.shady/config.yaml")?,
        };
        layers.extend(file_layer);

        layers.push(ConfigLayer {
            preset: self.preset,
            listen: self.listen.clone(),
            watch: self.watch.clone(),
            accept: self.accept,
            recursive: self.recursive.then_some(true),
        });

        core_config::resolve(&layers).context("invalid configuration")
    }
}
