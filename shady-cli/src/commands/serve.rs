//! `shady serve`: run the listener and the directory watcher in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.resolve()?;
        shady_daemon::start_blocking(config, self.log_json).context("server exited with error")?;
        Ok(())
    }
}
