//! CLI command handlers.

pub mod call;
pub mod cancel;
pub mod info;
pub mod status;
pub mod tools;

use anyhow::Result;
use ushell_mcp::{ClientConfig, McpClient};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved client configuration.
    pub config: ClientConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Connect and run blocking client work off the async runtime.
///
/// The connection is closed when `work` returns.
pub async fn with_client<T, F>(ctx: &Context, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut McpClient) -> ushell_mcp::Result<T> + Send + 'static,
{
    let config = ctx.config.clone();
    tokio::task::spawn_blocking(move || -> Result<T> {
        let mut client = McpClient::connect(config)?;
        let value = work(&mut client)?;
        client.close();
        Ok(value)
    })
    .await?
}

/// Truncate a string to `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ls", 10), "ls");
        assert_eq!(truncate("List directory contents", 10), "List di...");
        assert_eq!(truncate("ééééé", 5), "ééééé");
    }
}
