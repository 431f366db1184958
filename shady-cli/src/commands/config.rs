//! `shady config`: show the configuration `serve` would use.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use shady_core::ServerConfig;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct ConfigCmdArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit machine-readable JSON.
    #[arg(long, conflicts_with = "yaml")]
    pub json: bool,

    /// Emit YAML suitable for --config.
    #[arg(long)]
    pub yaml: bool,
}

impl ConfigCmdArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.resolve()?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("failed to render config JSON")?
            );
        } else if self.yaml {
            print!("{}", config.to_yaml().context("failed to render config YAML")?);
        } else {
            print_table(&config);
        }
        Ok(())
    }
}

fn print_table(config: &ServerConfig) {
    let rows = [
        ("listen", config.listen.to_string()),
        ("watch", config.watch_dir.display().to_string()),
        ("accept", config.accept.to_string()),
        ("recursive", config.recursive.to_string()),
    ];
    for (key, value) in rows {
        println!("{:<10} {}", key.bold(), value);
    }
}
