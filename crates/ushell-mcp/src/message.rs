//! Wire message types for the unified shell MCP protocol.
//!
//! Outbound requests are `{"id", "method", "params"}` objects. Inbound
//! messages are discriminated by a `type` field:
//!
//! ```text
//! {"type":"response","id":"1","result":{...}}
//! {"type":"error","id":"1","error":"tool not found"}
//! {"type":"notification","event":"tool_started","message":"pwd"}
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{McpError, Result};

/// A JSON object with arbitrary fields.
pub type JsonObject = Map<String, Value>;

/// Arguments passed to a tool. The only open-ended bag in the protocol.
pub type ToolArgs = Map<String, Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier stamped on a request by the correlator.
///
/// Serialized as a decimal string; ordering follows the numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Numeric value of the id.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Whether a wire id refers to this request.
    pub fn matches(self, wire_id: &str) -> bool {
        wire_id == self.to_string()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RequestId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Parameters of a request, tagged by method name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RequestParams {
    /// Handshake; returns server identity.
    Initialize(EmptyParams),
    /// Enumerate the tool catalog.
    ListTools(EmptyParams),
    /// Run a tool.
    CallTool(CallToolParams),
    /// Query a running or finished execution.
    GetExecutionStatus(ExecutionParams),
    /// Terminate a running execution.
    CancelExecution(ExecutionParams),
}

impl RequestParams {
    /// `initialize` with empty params.
    pub fn initialize() -> Self {
        Self::Initialize(EmptyParams {})
    }

    /// `list_tools` with empty params.
    pub fn list_tools() -> Self {
        Self::ListTools(EmptyParams {})
    }

    /// `call_tool` for `tool` with `args`.
    pub fn call_tool(tool: impl Into<String>, args: ToolArgs) -> Self {
        Self::CallTool(CallToolParams {
            tool: tool.into(),
            args,
        })
    }

    /// `get_execution_status` for an execution id.
    pub fn execution_status(execution_id: impl Into<String>) -> Self {
        Self::GetExecutionStatus(ExecutionParams {
            execution_id: execution_id.into(),
        })
    }

    /// `cancel_execution` for an execution id.
    pub fn cancel_execution(execution_id: impl Into<String>) -> Self {
        Self::CancelExecution(ExecutionParams {
            execution_id: execution_id.into(),
        })
    }

    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::ListTools(_) => "list_tools",
            Self::CallTool(_) => "call_tool",
            Self::GetExecutionStatus(_) => "get_execution_status",
            Self::CancelExecution(_) => "cancel_execution",
        }
    }
}

/// `{}` params.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmptyParams {}

/// Params of `call_tool`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallToolParams {
    /// Tool name as listed by `list_tools`.
    pub tool: String,
    /// Tool arguments.
    pub args: ToolArgs,
}

/// Params of `get_execution_status` and `cancel_execution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionParams {
    /// Execution id assigned by the server.
    pub execution_id: String,
}

/// A request envelope as written on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method and params.
    #[serde(flatten)]
    pub params: RequestParams,
}

impl Request {
    /// Wrap params with an id.
    pub fn new(id: RequestId, params: RequestParams) -> Self {
        Self { id, params }
    }

    /// Wire method name.
    pub fn method(&self) -> &'static str {
        self.params.method()
    }

    /// Serialize to a single line of JSON, without the delimiter.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound messages
// ─────────────────────────────────────────────────────────────────────────────

/// A progress event for the outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Event kind, e.g. `tool_started`, `tool_completed`, `tool_failed`.
    pub event: String,
    /// Free-form payload; the server usually puts the tool name here.
    pub message: String,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Terminal success.
    Response {
        /// Id of the request this answers.
        id: String,
        /// Method-specific result object.
        result: JsonObject,
    },
    /// Terminal failure.
    Error {
        /// Id of the request this answers, `None` when the server could not
        /// attribute the error to a request.
        id: Option<String>,
        /// Error text.
        error: String,
    },
    /// Non-terminal progress.
    Notification(Notification),
    /// A frame that could not be decoded.
    Malformed {
        /// Frame text.
        raw: String,
        /// Why decoding failed.
        cause: String,
    },
}

/// Serde view of the `type`-tagged shapes.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage {
    Response {
        id: String,
        result: JsonObject,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        error: String,
    },
    Notification {
        event: String,
        #[serde(default)]
        message: String,
    },
}

impl Message {
    /// Decode one frame. Never fails: undecodable input becomes
    /// [`Message::Malformed`].
    pub fn decode(frame: &[u8]) -> Self {
        let text = match std::str::from_utf8(frame) {
            Ok(text) => text,
            Err(e) => {
                return Self::Malformed {
                    raw: String::from_utf8_lossy(frame).into_owned(),
                    cause: format!("invalid UTF-8: {}", e),
                };
            }
        };

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Self::malformed(text, format!("invalid JSON: {}", e)),
        };

        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Self::malformed(text, "`type` is not a string"),
            None if value.is_object() => return Self::malformed(text, "missing `type` field"),
            None => return Self::malformed(text, "frame is not a JSON object"),
        };

        match serde_json::from_value::<WireMessage>(value) {
            Ok(WireMessage::Response { id, result }) => Self::Response { id, result },
            Ok(WireMessage::Error { id, error }) => Self::Error { id, error },
            Ok(WireMessage::Notification { event, message }) => {
                Self::Notification(Notification { event, message })
            }
            Err(e) => Self::malformed(text, format!("invalid `{}` message: {}", kind, e)),
        }
    }

    fn malformed(raw: &str, cause: impl Into<String>) -> Self {
        Self::Malformed {
            raw: raw.to_string(),
            cause: cause.into(),
        }
    }

    /// Whether this message ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response { .. } | Self::Error { .. })
    }

    /// Message kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Notification(_) => "notification",
            Self::Malformed { .. } => "malformed",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed results
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a response `result` object into a typed result.
pub fn parse_result<T: DeserializeOwned>(method: &str, result: JsonObject) -> Result<T> {
    serde_json::from_value(Value::Object(result))
        .map_err(|e| McpError::protocol(format!("unexpected `{}` result: {}", method, e)))
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub server: String,
    /// Server version.
    pub version: String,
    /// Any other fields the server reports.
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A tool listed by `list_tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments, passed through untouched.
    #[serde(
        rename = "inputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// Result of `list_tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Tools in server order.
    pub tools: Vec<ToolDescriptor>,
}

/// Result of a successful `call_tool`.
///
/// Regular commands report `output` and `exit_code`; built-in tools such as
/// `get_shell_info` return their own fields, kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Resolved tool name, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Captured standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Process exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    /// Remaining result fields.
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl CallToolResult {
    /// The captured output, or `""` when none was reported.
    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }

    /// Whether the command reported a zero (or no) exit code.
    pub fn succeeded(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }
}

/// State of a server-side execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// Still running.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed or cancelled.
    Failed,
}

/// Result of `get_execution_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    /// Execution id.
    pub execution_id: String,
    /// Tool being executed.
    pub tool: String,
    /// Current state.
    pub status: ExecutionState,
    /// Seconds since the execution started.
    pub elapsed_time: i64,
    /// Server-side process id.
    pub pid: i64,
}

/// Result of `cancel_execution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    /// Usually `cancelled`.
    pub status: String,
}
