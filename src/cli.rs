use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "inbox-sync",
    about = "Live chat inbox synchronization engine with a line-oriented agent console"
)]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Connect to the inbox and start the console
    Run,
    /// Print the resolved configuration with secrets redacted
    CheckConfig,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn defaults_to_run_when_command_is_missing() {
        let cli = Cli::parse_from(["inbox-sync"]);

        assert_eq!(cli.command_or_default(), Command::Run);
    }

    #[test]
    fn parses_check_config_with_global_config_flag() {
        let cli = Cli::parse_from(["inbox-sync", "check-config", "--config", "desk.toml"]);

        assert_eq!(cli.command_or_default(), Command::CheckConfig);
        assert_eq!(
            cli.config
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("desk.toml".to_owned())
        );
    }
}
