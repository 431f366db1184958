//! `shady greet`: diagnostic greeting.

use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct GreetArgs {
    /// Who to greet.
    pub name: String,
}

impl GreetArgs {
    pub fn run(self) -> Result<()> {
        println!("{}", shady_daemon::greet(&self.name));
        Ok(())
    }
}
