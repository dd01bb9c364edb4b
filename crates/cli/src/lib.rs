pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "shopdesk",
    about = "Shopdesk operator CLI",
    long_about = "Operate the Shopdesk assistant: migrations, demo catalog, readiness checks, config inspection, and one-off chat messages.",
    after_help = "Examples:\n  shopdesk migrate\n  shopdesk seed\n  shopdesk doctor --json\n  shopdesk ask \"do you have WH-SWP-100 in stock?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the sample product catalog and orders (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and hosted model readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one message through the rule-based chat pipeline")]
    Ask {
        #[arg(required = true, num_args = 1.., help = "Message text; words are joined with spaces")]
        message: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { message } => commands::ask::run(&message.join(" ")),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
