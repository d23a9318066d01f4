use clap::{ArgAction, Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use guildrelay::attachments::{AttachmentDescriptor, AttachmentPipeline};
use guildrelay::config::RelayConfig;
use guildrelay::error::ClassifiedError;
use guildrelay::logging::init_logging;
use guildrelay::mcp::RelayMcpServer;

#[derive(Parser, Debug)]
#[command(name = "guildrelay")]
#[command(version)]
#[command(about = "MCP adapter for Discord with resilient dispatch and attachment ingestion")]
struct Cli {
    /// Path to the configuration file [default: ./guildrelay.toml if present]
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the MCP tools over stdio (default if no command given)
    Serve,

    /// Validate and resolve a JSON array of attachment descriptors without sending anything
    Attachments {
        /// File holding the descriptors
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the effective configuration with the token redacted
    Config,
}

/// Exit codes for the one-shot commands
mod exit_codes {
    use std::process::ExitCode;

    /// The attachments were rejected
    pub fn rejected() -> ExitCode {
        ExitCode::from(1)
    }

    /// The configuration could not be loaded
    pub fn bad_config() -> ExitCode {
        ExitCode::from(78)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match RelayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(exit_codes::bad_config());
        }
    };

    // Logging goes to stderr; stdout carries the MCP protocol
    let logging = config
        .logging
        .to_logging_config()
        .with_cli_overrides(cli.verbose, cli.quiet);
    if let Err(e) = init_logging(logging) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    match RelayConfig::resolve_path(cli.config.as_deref()) {
        Some(path) => tracing::debug!(file = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No configuration file, using defaults"),
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Attachments { file } => check_attachments(&file).await,
        Commands::Config => {
            print!("{}", config.to_redacted_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: &RelayConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let server = match RelayMcpServer::from_config(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Error creating MCP server: {}", e);
            eprintln!("Error: {e}");
            return Ok(exit_codes::bad_config());
        }
    };

    tracing::info!(
        api_base = %config.discord.api_base,
        max_attempts = config.retry.max_attempts,
        "Starting MCP server"
    );

    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting MCP server: {}", e);
        e
    })?;

    service.waiting().await?;
    tracing::info!("MCP server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn check_attachments(file: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let descriptors: Vec<AttachmentDescriptor> = serde_json::from_str(&raw)
        .map_err(|e| format!("failed to parse {}: {e}", file.display()))?;

    match AttachmentPipeline::default().process(&descriptors).await {
        Ok(resolved) => {
            let summaries: Vec<_> = resolved.iter().map(|a| a.summary()).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let classified = ClassifiedError::from(e);
            println!("{}", serde_json::to_string_pretty(&classified.to_json())?);
            Ok(exit_codes::rejected())
        }
    }
}
