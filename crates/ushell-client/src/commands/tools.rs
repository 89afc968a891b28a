//! Tools command - list the tools the server offers.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::{Context, truncate, with_client};

/// Arguments for the tools command.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show at most N tools
    #[arg(short = 'n', long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Run the tools command.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<ExitCode> {
    let mut tools = with_client(ctx, |client| {
        client.initialize()?;
        client.list_tools()
    })
    .await?;

    if let Some(limit) = args.limit {
        tools.truncate(limit);
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(ExitCode::SUCCESS);
    }

    if tools.is_empty() {
        println!("No tools available.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<24} {:<54}", "NAME", "DESCRIPTION");
    println!("{}", "-".repeat(80));
    for tool in &tools {
        println!(
            "{:<24} {:<54}",
            truncate(&tool.name, 24),
            truncate(&tool.description, 54)
        );
        if ctx.verbose {
            if let Some(schema) = &tool.input_schema {
                println!("  Schema: {}", schema);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
