//! Status command - show the state of a server-side execution.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::Style;
use ushell_mcp::ExecutionState;

use super::{Context, with_client};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Execution id (e.g. `exec_3`)
    pub execution_id: String,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<ExitCode> {
    let execution_id = args.execution_id;
    let status = with_client(ctx, move |client| client.execution_status(&execution_id)).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(ExitCode::SUCCESS);
    }

    let dim = Style::new().dim();
    let state = match status.status {
        ExecutionState::Running => Style::new().yellow().apply_to("● running"),
        ExecutionState::Completed => Style::new().green().apply_to("● completed"),
        ExecutionState::Failed => Style::new().red().apply_to("● failed"),
    };

    println!("  {} {}", dim.apply_to("Execution:"), status.execution_id);
    println!("  {} {}", dim.apply_to("Tool:"), status.tool);
    println!("  {} {}", dim.apply_to("Status:"), state);
    println!("  {} {}s", dim.apply_to("Elapsed:"), status.elapsed_time);
    println!("  {} {}", dim.apply_to("PID:"), status.pid);

    Ok(ExitCode::SUCCESS)
}
