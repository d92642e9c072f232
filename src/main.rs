mod cli;
mod config;
mod gemini_client;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::conversation_state::ConversationState;
use crate::cli::chat::ChatContext;
use crate::config::{ChatConfig, ConfigError, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::gemini_client::GeminiClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Send a single message, print the reply and exit
    #[arg(short, long)]
    input: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Gemini model to talk to
    #[arg(short, long, default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Base URL of the Gemini API
    #[arg(long, default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Request timeout in seconds, 0 for none
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Send a single message, print the reply and exit
        #[arg(short, long)]
        input: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Writes the two-line startup diagnostic and picks the exit code.
fn report_config_error(out: &mut impl Write, err: &ConfigError) -> io::Result<ExitCode> {
    writeln!(out, "Error: {}", err)?;
    match err {
        ConfigError::MissingApiKey(var) => {
            writeln!(out, "Set {} in your environment or in a .env file and try again.", var)?
        }
        ConfigError::InvalidBaseUrl { .. } => {
            writeln!(out, "Pass a full http(s) URL to --base-url and try again.")?
        }
    }
    Ok(ExitCode::FAILURE)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let (input, verbose) = match cli.command {
        Some(Commands::Chat { input, verbose }) => (input.or(cli.input), verbose || cli.verbose),
        None => (cli.input, cli.verbose),
    };

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Diagnostics go to stderr so they never mix with the conversation.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    debug!("Starting persona chat");

    let config = match ChatConfig::from_env(&cli.model, &cli.base_url, cli.timeout_secs) {
        Ok(config) => config,
        Err(e) => return Ok(report_config_error(&mut io::stderr(), &e)?),
    };

    debug!(model = %config.model, timeout = ?config.timeout, "Configured Gemini client");

    let client = GeminiClient::new(&config)?;
    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        input,
        ConversationState::default(),
        Box::new(client),
    );
    chat_context.run().await
}
