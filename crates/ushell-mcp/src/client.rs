//! MCP client for the unified shell's tool server.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::connection::{Connection, ShutdownHandle, deadline_after};
use crate::correlator::Correlator;
use crate::error::{McpError, Result};
use crate::message::{
    CallToolResult, CancelResult, ExecutionStatus, ListToolsResult, Message, Notification,
    RequestId, RequestParams, ServerInfo, ToolArgs, ToolDescriptor, parse_result,
};
use crate::session::{Finished, Session, Terminal};

/// How a tool call ended. Both arms are normal outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran; see `exit_code` for its own status.
    Completed(CallToolResult),
    /// The server refused or failed to run the tool.
    Failed(String),
}

/// Everything observed during one `call_tool` exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// Id of the request.
    pub id: RequestId,
    /// Tool that was called.
    pub tool: String,
    /// Notifications received before the terminal message, in wire order.
    pub notifications: Vec<Notification>,
    /// Terminal outcome.
    pub outcome: ToolOutcome,
    /// Notifications the server sent after the terminal message
    /// (`tool_completed`, `tool_failed`).
    pub trailing: Vec<Notification>,
}

impl CallOutcome {
    /// The result, if the tool ran.
    pub fn result(&self) -> Option<&CallToolResult> {
        match &self.outcome {
            ToolOutcome::Completed(result) => Some(result),
            ToolOutcome::Failed(_) => None,
        }
    }

    /// The server's error text, if the call failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Completed(_) => None,
            ToolOutcome::Failed(error) => Some(error),
        }
    }

    /// Whether the tool ran and reported success.
    pub fn is_success(&self) -> bool {
        self.result().is_some_and(CallToolResult::succeeded)
    }
}

/// An MCP client connected to a single server.
///
/// Every operation takes `&mut self`: the protocol allows one request in
/// flight, and the borrow checker holds callers to it.
pub struct McpClient {
    /// Client configuration.
    config: ClientConfig,
    /// The live connection.
    connection: Connection,
    /// Request ids for `connection`.
    correlator: Correlator,
    /// Server identity (after initialization).
    server_info: Option<ServerInfo>,
}

impl McpClient {
    /// Connect to the configured server.
    ///
    /// This does NOT initialize the session - call `initialize()` after connecting.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let connection = Connection::connect(&config.host, config.port, config.connect_timeout)?;

        Ok(Self {
            config,
            connection,
            correlator: Correlator::new(),
            server_info: None,
        })
    }

    /// Connect to `host:port` with default settings.
    pub fn connect_to(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::connect(ClientConfig::new(host, port))
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.server_info.is_some()
    }

    /// Check if the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Send a request and return its session for manual stepping.
    pub fn begin(&mut self, params: RequestParams) -> Result<Session<'_>> {
        let method = params.method();
        let id = self.correlator.issue(&mut self.connection, params)?;
        Ok(Session::new(
            &mut self.connection,
            id,
            method,
            self.config.request_timeout,
        ))
    }

    /// Send a request and run its session to the terminal message.
    fn request(&mut self, params: RequestParams) -> Result<Finished> {
        let policy = self.config.malformed;
        self.begin(params)?.run(policy, |_| {})
    }

    /// Perform the `initialize` handshake.
    ///
    /// Any outcome other than a response is a startup failure. Calling this
    /// again returns the cached server info.
    pub fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.server_info.is_none() {
            let info = self
                .handshake()
                .map_err(|e| McpError::Startup(Box::new(e)))?;

            tracing::info!(
                addr = %self.config.addr(),
                server = %info.server,
                version = %info.version,
                "MCP server initialized"
            );
            self.server_info = Some(info);
        }

        self.server_info.as_ref().ok_or_else(|| {
            McpError::Startup(Box::new(McpError::protocol("server info missing")))
        })
    }

    fn handshake(&mut self) -> Result<ServerInfo> {
        match self.request(RequestParams::initialize())?.terminal {
            Terminal::Completed(result) => parse_result("initialize", result),
            Terminal::Failed(error) => Err(McpError::server(error)),
        }
    }

    /// List available tools, in server order.
    pub fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let list: ListToolsResult = match self.request(RequestParams::list_tools())?.terminal {
            Terminal::Completed(result) => parse_result("list_tools", result)?,
            Terminal::Failed(error) => return Err(McpError::server(error)),
        };

        tracing::debug!(
            addr = %self.config.addr(),
            tool_count = list.tools.len(),
            "listed MCP tools"
        );

        Ok(list.tools)
    }

    /// Call a tool and wait for its outcome.
    ///
    /// A server-side failure is returned as [`ToolOutcome::Failed`], not as
    /// an error.
    pub fn call_tool(&mut self, name: &str, args: ToolArgs) -> Result<CallOutcome> {
        self.call_tool_with(name, args, |_| {})
    }

    /// Call a tool, reporting each notification to `on_notification` as it
    /// arrives.
    pub fn call_tool_with<F>(&mut self, name: &str, args: ToolArgs, on_notification: F) -> Result<CallOutcome>
    where
        F: FnMut(&Notification),
    {
        let policy = self.config.malformed;
        let finished = self
            .begin(RequestParams::call_tool(name, args))?
            .run(policy, on_notification)?;

        let parsed = match finished.terminal {
            Terminal::Completed(result) => {
                parse_result("call_tool", result).map(ToolOutcome::Completed)
            }
            Terminal::Failed(error) => Ok(ToolOutcome::Failed(error)),
        };

        // The exchange is over on the wire even if its result is unusable.
        let trailing = self.settle_trailing();
        let outcome = parsed?;

        match &outcome {
            ToolOutcome::Completed(result) => tracing::debug!(
                tool = %name,
                exit_code = ?result.exit_code,
                "tool call completed"
            ),
            ToolOutcome::Failed(error) => tracing::warn!(
                tool = %name,
                error = %error,
                "tool call failed"
            ),
        }

        Ok(CallOutcome {
            id: finished.id,
            tool: name.to_string(),
            notifications: finished.notifications,
            outcome,
            trailing,
        })
    }

    /// Query a server-side execution.
    pub fn execution_status(&mut self, execution_id: &str) -> Result<ExecutionStatus> {
        match self
            .request(RequestParams::execution_status(execution_id))?
            .terminal
        {
            Terminal::Completed(result) => parse_result("get_execution_status", result),
            Terminal::Failed(error) => Err(McpError::server(error)),
        }
    }

    /// Cancel a server-side execution.
    pub fn cancel_execution(&mut self, execution_id: &str) -> Result<CancelResult> {
        let cancelled = match self
            .request(RequestParams::cancel_execution(execution_id))?
            .terminal
        {
            Terminal::Completed(result) => parse_result("cancel_execution", result),
            Terminal::Failed(error) => Err(McpError::server(error)),
        };

        for notification in self.settle_trailing() {
            tracing::debug!(event = %notification.event, message = %notification.message, "post-cancel notification");
        }

        cancelled
    }

    /// Collect notifications that follow a terminal message.
    ///
    /// Anything else that shows up is pushed back for the next session, which
    /// will reject it if it belongs to an older request.
    fn settle_trailing(&mut self) -> Vec<Notification> {
        let grace = self.config.trailing_grace;
        let deadline = deadline_after(grace);
        let mut trailing = Vec::new();

        loop {
            match self.connection.receive_until(deadline, grace) {
                Ok(Message::Notification(notification)) => trailing.push(notification),
                Ok(other) => {
                    tracing::debug!(kind = other.kind(), "message after terminal, deferring");
                    self.connection.unread(other);
                    break;
                }
                Err(McpError::Timeout(_)) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "connection ended after terminal message");
                    break;
                }
            }
        }

        trailing
    }

    /// Discard stale messages after a timeout so the connection can be
    /// reused. Prefer [`reconnect`](Self::reconnect).
    pub fn drain(&mut self, quiet: Duration) -> Result<usize> {
        self.connection.drain(quiet)
    }

    /// Close the connection and open a fresh one.
    ///
    /// Request ids restart and the handshake must be repeated.
    pub fn reconnect(&mut self) -> Result<()> {
        self.connection.close();
        self.server_info = None;
        self.correlator = Correlator::new();
        self.connection = Connection::connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )?;
        tracing::info!(addr = %self.config.addr(), "reconnected to MCP server");
        Ok(())
    }

    /// A handle that can abort an in-flight call from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        self.connection.shutdown_handle()
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.connection.close();
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("config", &self.config)
            .field("connection", &self.connection)
            .field("server_info", &self.server_info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(output: &str, exit_code: i64) -> CallOutcome {
        CallOutcome {
            id: RequestId::new(1),
            tool: "pwd".into(),
            notifications: Vec::new(),
            outcome: ToolOutcome::Completed(CallToolResult {
                output: Some(output.into()),
                exit_code: Some(exit_code),
                ..Default::default()
            }),
            trailing: Vec::new(),
        }
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = completed("/home/user", 0);
        assert!(ok.is_success());
        assert_eq!(ok.result().map(CallToolResult::output), Some("/home/user"));
        assert!(ok.error().is_none());

        let nonzero = completed("", 2);
        assert!(!nonzero.is_success());
        assert!(nonzero.result().is_some());

        let failed = CallOutcome {
            outcome: ToolOutcome::Failed("tool not found".into()),
            ..completed("", 0)
        };
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some("tool not found"));
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = McpClient::connect(
            ClientConfig::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(1)),
        );
        assert!(matches!(result, Err(McpError::Connection { .. })));
    }
}
