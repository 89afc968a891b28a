//! ushell-client - command-line client for the unified shell's MCP server.
//!
//! Main entry point for the ushell-client CLI.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{call, cancel, info, status, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// ushell-client - talk to a unified shell MCP server
#[derive(Parser)]
#[command(name = "ushell-client")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server host (default: localhost)
    #[arg(long, global = true, env = "MCP_HOST")]
    pub host: Option<String>,

    /// Server port (default: 9000)
    #[arg(long, global = true, env = "MCP_PORT")]
    pub port: Option<u16>,

    /// Per-request timeout in seconds (default: 30)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Config file (default: <config dir>/ushell/mcp.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect, initialize and show the server identity
    Info(info::InfoArgs),

    /// List the tools the server offers
    Tools(tools::ToolsArgs),

    /// Invoke a tool and stream its progress
    Call(call::CallArgs),

    /// Show the state of a server-side execution
    Status(status::StatusArgs),

    /// Cancel a server-side execution
    Cancel(cancel::CancelArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Console logs go to stderr so stdout stays clean for results.
    let filter = if cli.verbose {
        "ushell_client=debug,ushell_mcp=debug,info"
    } else {
        "ushell_client=info,ushell_mcp=warn,warn"
    };

    let log_dir = ushell_mcp::config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ushell-client.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "ushell_client=trace,ushell_mcp=trace,info",
                )),
        )
        .init();

    // Defaults < config file < environment < flags
    let loaded = ushell_mcp::load_config(cli.config.as_deref())?;
    let mut config = loaded.config;
    if let Some(host) = cli.host {
        config = config.with_host(host);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    config.validate()?;

    tracing::debug!(
        addr = %config.addr(),
        config_file = ?loaded.source,
        "resolved client configuration"
    );

    // Create context for commands
    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Info(args) => info::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Cancel(args) => cancel::run(args, &ctx).await,
    }
}
