pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deploydesk",
    about = "Deploydesk operator CLI",
    long_about = "Inspect configuration, list approved software, check authority readiness, and run a deployment conversation from the terminal.",
    after_help = "Examples:\n  deploydesk config --json\n  deploydesk software\n  deploydesk doctor\n  deploydesk chat"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the approved software catalog in dialogue order")]
    Software {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Validate config, authority URLs, and identity token readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run an interactive deployment conversation on stdin/stdout")]
    Chat,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config { json } => commands::config::run(json),
        Command::Software { json } => commands::software::run(json),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chat => commands::chat::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
