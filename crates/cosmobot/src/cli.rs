use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cosmobot")]
#[command(author, version, about = "Telegram bot for the Cosmic Treasure Hunt mini-app", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot in normal mode
    Run,

    /// Run the bot in staging mode (uses staging environment variables)
    RunStaging,

    /// Print the prize catalog with draw probabilities and exit
    Catalog,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
