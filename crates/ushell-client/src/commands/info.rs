//! Info command - initialize and show the server identity.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::{Context, with_client};

/// Arguments for the info command.
#[derive(Args, Debug)]
pub struct InfoArgs {}

/// Server identity for JSON output.
#[derive(Debug, Serialize)]
struct InfoOutput {
    address: String,
    server: String,
    version: String,
    #[serde(flatten)]
    extra: ushell_mcp::JsonObject,
}

/// Run the info command.
pub async fn run(_args: InfoArgs, ctx: &Context) -> Result<ExitCode> {
    let info = with_client(ctx, |client| client.initialize().cloned()).await?;
    let address = ctx.config.addr();

    if ctx.json_output {
        let output = InfoOutput {
            address,
            server: info.server,
            version: info.version,
            extra: info.extra,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let dim = Style::new().dim();

        println!();
        println!("{}", style("MCP Server").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Address:"), address);
        println!("  {} {}", dim.apply_to("Server:"), info.server);
        println!("  {} {}", dim.apply_to("Version:"), info.version);
        if ctx.verbose {
            for (key, value) in &info.extra {
                println!("  {} {}", dim.apply_to(format!("{}:", key)), value);
            }
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
