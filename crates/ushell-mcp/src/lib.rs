//! MCP client for the unified shell's tool server.
//!
//! This crate speaks the shell's line-delimited JSON protocol over TCP:
//! discover the server, list its tools, invoke them and follow the progress
//! notifications each invocation produces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - initialize, list_tools, call_tool                        │
//! │  - get_execution_status, cancel_execution                   │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Correlator + Session                                       │
//! │  - Monotonic request ids                                    │
//! │  - Pending → InProgress → Completed/Failed/TimedOut/...     │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Connection                                                 │
//! │  - TCP stream, one outstanding request                      │
//! │  - FrameDecoder (newline framing) → Message                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use ushell_mcp::{McpClient, ToolArgs, ToolOutcome};
//!
//! # fn main() -> ushell_mcp::Result<()> {
//! let mut client = McpClient::connect_to("localhost", 9000)?;
//! let info = client.initialize()?;
//! println!("Connected to: {} v{}", info.server, info.version);
//!
//! for tool in client.list_tools()? {
//!     println!("Tool: {} - {}", tool.name, tool.description);
//! }
//!
//! let outcome = client.call_tool_with("pwd", ToolArgs::new(), |n| {
//!     println!("[{}] {}", n.event, n.message);
//! })?;
//! match outcome.outcome {
//!     ToolOutcome::Completed(result) => println!("{}", result.output()),
//!     ToolOutcome::Failed(error) => eprintln!("tool failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Wire Protocol
//!
//! Each message is one JSON object followed by `\n`:
//!
//! ```text
//! → {"id":"1","method":"call_tool","params":{"tool":"ls","args":{"path":"/"}}}
//! ← {"id":null,"type":"notification","event":"tool_started","message":"ls"}
//! ← {"id":"1","type":"response","result":{"tool":"ls","output":"...","exit_code":0}}
//! ← {"id":null,"type":"notification","event":"tool_completed","message":"ls"}
//! ```
//!
//! Only one request may be outstanding per connection.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;

// Re-export main types
pub use client::{CallOutcome, McpClient, ToolOutcome};
pub use config::{ClientConfig, ConfigFile, LoadedConfig, load_config};
pub use connection::{Connection, ShutdownHandle};
pub use correlator::Correlator;
pub use error::{ConfigError, ConfigResult, McpError, Result};
pub use frame::FrameDecoder;
pub use message::{
    CallToolResult, CancelResult, ExecutionState, ExecutionStatus, JsonObject, Message,
    Notification, Request, RequestId, RequestParams, ServerInfo, ToolArgs, ToolDescriptor,
};
pub use session::{Finished, MalformedPolicy, Session, SessionState, Step, Terminal};
