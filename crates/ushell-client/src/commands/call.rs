//! Call command - invoke a tool and stream its progress.
//!
//! The blocking client runs on a worker thread; notifications are forwarded
//! over a channel and printed as they arrive. Ctrl-C closes the connection,
//! which is the only way to abandon a call in flight.

use std::process::ExitCode;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::Args;
use console::Style;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use ushell_mcp::{
    CallOutcome, CallToolResult, McpClient, Notification, RequestId, ToolArgs, ToolOutcome,
};

use super::Context;

/// Arguments for the call command.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name (see `ushell-client tools`)
    pub tool: String,

    /// Tool argument in KEY=VALUE format (repeatable)
    #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// Tool arguments as a JSON object; `--arg` values take precedence
    #[arg(long, value_name = "JSON")]
    pub args_json: Option<String>,
}

/// Call report for JSON output.
#[derive(Debug, Serialize)]
struct CallOutput<'a> {
    id: RequestId,
    tool: &'a str,
    status: &'static str,
    notifications: &'a [Notification],
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a CallToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    trailing: &'a [Notification],
}

/// Run the call command.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<ExitCode> {
    let tool_args = parse_tool_args(&args.args, args.args_json.as_deref())?;

    let config = ctx.config.clone();
    let mut client = tokio::task::spawn_blocking(move || McpClient::connect(config)).await??;
    let handle = client.shutdown_handle()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let tool = args.tool.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        client.initialize()?;
        client.call_tool_with(&tool, tool_args, |notification| {
            let _ = tx.send(notification.clone());
        })
    });

    let mut cancelled = false;
    let result = loop {
        tokio::select! {
            biased;
            Some(notification) = rx.recv() => print_notification(&notification, ctx),
            joined = &mut task => break joined?,
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                tracing::info!(tool = %args.tool, "interrupted, closing connection");
                handle.close();
                cancelled = true;
            }
        }
    };

    while let Ok(notification) = rx.try_recv() {
        print_notification(&notification, ctx);
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if cancelled => bail!("call to '{}' cancelled ({})", args.tool, e),
        Err(e) => return Err(e).with_context(|| format!("call to '{}' failed", args.tool)),
    };

    report(&outcome, ctx)?;

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_notification(notification: &Notification, ctx: &Context) {
    if ctx.json_output {
        return;
    }
    let dim = Style::new().dim();
    eprintln!(
        "{} {}",
        dim.apply_to(format!("[{}]", notification.event)),
        notification.message
    );
}

fn report(outcome: &CallOutcome, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let output = CallOutput {
            id: outcome.id,
            tool: &outcome.tool,
            status: match &outcome.outcome {
                ToolOutcome::Completed(_) => "completed",
                ToolOutcome::Failed(_) => "failed",
            },
            notifications: &outcome.notifications,
            result: outcome.result(),
            error: outcome.error(),
            trailing: &outcome.trailing,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &outcome.outcome {
        ToolOutcome::Completed(result) => {
            let output = result.output();
            print!("{}", output);
            if !output.is_empty() && !output.ends_with('\n') {
                println!();
            }
            if !result.extra.is_empty() {
                println!("{}", serde_json::to_string_pretty(&result.extra)?);
            }
            if let Some(code) = result.exit_code.filter(|code| *code != 0) {
                eprintln!("{}", Style::new().red().apply_to(format!("exit code {}", code)));
            }
        }
        ToolOutcome::Failed(error) => {
            eprintln!("{} {}", Style::new().red().apply_to("Error:"), error);
        }
    }

    for notification in &outcome.trailing {
        print_notification(notification, ctx);
    }

    Ok(())
}

/// Build tool arguments from `--args-json` and `--arg KEY=VALUE` pairs.
///
/// Values from `--arg` are always strings.
fn parse_tool_args(pairs: &[String], json: Option<&str>) -> Result<ToolArgs> {
    let mut args = match json {
        Some(text) => match serde_json::from_str::<Value>(text)
            .with_context(|| format!("Invalid --args-json: '{}'", text))?
        {
            Value::Object(map) => map,
            other => bail!("--args-json must be a JSON object, got: {}", other),
        },
        None => ToolArgs::new(),
    };

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid argument format: '{}'. Use KEY=VALUE.", pair))?;
        if key.is_empty() {
            bail!("Invalid argument format: '{}'. Key must not be empty.", pair);
        }
        args.insert(key.to_string(), Value::String(value.to_string()));
    }

    Ok(args)
}
