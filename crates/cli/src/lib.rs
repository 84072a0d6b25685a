pub mod commands;

use clap::{Parser, Subcommand};
use coverwise_core::config::{AppConfig, LogFormat};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "coverwise",
    about = "Coverwise insurance chat agent CLI",
    long_about = "Chat with the insurance collection agents, inspect effective configuration, and run readiness checks.",
    after_help = "Examples:\n  coverwise chat --session demo\n  coverwise config\n  coverwise doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session over stdin")]
    Chat {
        #[arg(long, help = "Session id to use; a random one is generated when omitted")]
        session: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credentials, client setup, and the product catalog")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { session } => commands::chat::run(session),
        Command::Config => commands::CommandResult::text(0, commands::config::run()),
        Command::Doctor { json } => commands::CommandResult::text(0, commands::doctor::run(json)),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Logs go to stderr so they do not interleave
/// with chat replies on stdout.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if installed.is_err() {
        tracing::debug!(event_name = "cli.logging_already_initialised", "subscriber already set");
    }
}
