pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "qabot",
    about = "QA bot operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, list deployments, \
                  and discover chat/topic ids for the QA bot.",
    after_help = "Examples:\n  qabot doctor --json\n  qabot deployments --limit 5\n  \
                  qabot discover --timeout-secs 30"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database readiness, and bot token identity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the most recent recorded deployments, newest first")]
    Deployments {
        #[arg(long, default_value_t = 10, help = "Maximum number of rows to print")]
        limit: u32,
    },
    #[command(about = "Long-poll once and print the chat and topic ids of incoming messages")]
    Discover {
        #[arg(long, default_value_t = 30, help = "Long-poll timeout in seconds")]
        timeout_secs: u64,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Deployments { limit } => commands::deployments::run(limit),
        Command::Discover { timeout_secs } => commands::discover::run(timeout_secs),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn deployments_limit_defaults_to_ten() {
        let cli = Cli::try_parse_from(["qabot", "deployments"]).expect("parse");
        assert!(matches!(cli.command, Command::Deployments { limit: 10 }));
    }

    #[test]
    fn discover_accepts_a_timeout() {
        let cli =
            Cli::try_parse_from(["qabot", "discover", "--timeout-secs", "5"]).expect("parse");
        assert!(matches!(cli.command, Command::Discover { timeout_secs: 5 }));
    }
}
