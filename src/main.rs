//! MCP Server Entry Point
//!
//! Initializes logging, loads configuration and dispatches the CLI command.
//! Logs go to stderr so stdout stays free for the STDIO transport.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use protocol_mcp_server::cli::{self, Cli, Command};
use protocol_mcp_server::core::{Config, McpServer, TransportService};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env();

    init_logging(&config.logging.level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::ValidateProtocol { path } => {
            let validator = cli::validator(&config.protocols);
            let result = cli::validate_file(&validator, &path, config.protocols.max_source_bytes);
            print!("{}", result.render());
            Ok(exit_code(result.is_valid()))
        }
        Command::ValidateAllProtocols { dir } => {
            let dir = dir
                .or_else(|| config.protocols.directory.clone())
                .context("no protocols directory given or configured")?;
            let validator = cli::validator(&config.protocols);
            let results = cli::validate_directory(&validator, &dir, config.protocols.max_source_bytes)?;

            let valid = results.iter().filter(|r| r.is_valid()).count();
            for result in &results {
                print!("{}", result.render());
            }
            println!("\n{valid}/{} protocol(s) valid", results.len());
            Ok(exit_code(valid == results.len()))
        }
    }
}

async fn serve(config: Config) -> Result<ExitCode> {
    info!("Starting {} v{}", config.server.name, config.server.version);

    let transport = TransportService::new(config.transport.clone());
    let server = McpServer::new(config).context("failed to initialize server")?;

    let active = server.bootstrap().await?;
    info!("Server initialized with {} active protocol(s)", active);

    transport.run(server).await?;

    info!("Server shutting down");
    Ok(ExitCode::SUCCESS)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Initialize the logging subsystem.
///
/// `RUST_LOG` directives are honoured; `MCP_LOG_LEVEL` sets the baseline.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
