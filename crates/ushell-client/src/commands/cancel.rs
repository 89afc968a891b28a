//! Cancel command - terminate a server-side execution.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{Context, with_client};

/// Arguments for the cancel command.
#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Execution id (e.g. `exec_3`)
    pub execution_id: String,
}

/// Run the cancel command.
pub async fn run(args: CancelArgs, ctx: &Context) -> Result<ExitCode> {
    let execution_id = args.execution_id.clone();
    let result = with_client(ctx, move |client| client.cancel_execution(&execution_id)).await?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "execution_id": args.execution_id,
                "status": result.status,
            }))?
        );
    } else {
        println!("Execution {}: {}", args.execution_id, result.status);
    }

    Ok(ExitCode::SUCCESS)
}
