//! Scripted MCP server for integration testing.
//!
//! The server runs in-process on a loopback port. Each accepted connection
//! plays the next [`Conversation`]: a list of [`Exchange`]s, each of which
//! optionally reads one request line and then writes its replies.
//!
//! `$ID` in a reply line is replaced with the id of the most recent request.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use ushell_mcp::ClientConfig;

/// Placeholder for the current request id.
pub const ID: &str = "$ID";

/// One thing the server writes (or does).
#[derive(Debug, Clone)]
pub enum Reply {
    /// A frame; `\n` is appended and `$ID` substituted.
    Line(String),
    /// Bytes written verbatim.
    Raw(Vec<u8>),
    /// Flush and pause.
    Sleep(Duration),
    /// Flush and close the connection.
    Close,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self::Line(value.to_string())
    }

    pub fn response(result: Value) -> Self {
        Self::json(json!({"id": ID, "type": "response", "result": result}))
    }

    pub fn response_for(id: &str, result: Value) -> Self {
        Self::json(json!({"id": id, "type": "response", "result": result}))
    }

    pub fn error(message: &str) -> Self {
        Self::json(json!({"id": ID, "type": "error", "error": message}))
    }

    pub fn unattributed_error(message: &str) -> Self {
        Self::json(json!({"id": null, "type": "error", "error": message}))
    }

    pub fn notification(event: &str, message: &str) -> Self {
        Self::json(json!({"id": null, "type": "notification", "event": event, "message": message}))
    }

    pub fn raw(text: &str) -> Self {
        Self::Raw(text.as_bytes().to_vec())
    }

    pub fn sleep_ms(ms: u64) -> Self {
        Self::Sleep(Duration::from_millis(ms))
    }

    /// The `initialize` result the unified shell sends.
    pub fn server_info() -> Self {
        Self::response(json!({"server": "unified-shell MCP", "version": "1.0"}))
    }
}

/// Replies to one request.
#[derive(Debug, Clone)]
pub struct Exchange {
    read_request: bool,
    replies: Vec<Reply>,
    chunk: Option<usize>,
}

impl Exchange {
    /// Read a request line, then write `replies`.
    pub fn on_request(replies: Vec<Reply>) -> Self {
        Self {
            read_request: true,
            replies,
            chunk: None,
        }
    }

    /// Write `replies` without waiting for a request.
    pub fn unsolicited(replies: Vec<Reply>) -> Self {
        Self {
            read_request: false,
            replies,
            chunk: None,
        }
    }

    /// Write in pieces of at most `size` bytes, flushing each.
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk = Some(size.max(1));
        self
    }
}

pub type Conversation = Vec<Exchange>;

/// A running mock server.
pub struct MockServer {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockServer {
    /// Serve one conversation per accepted connection, in accept order.
    pub fn start(conversations: Vec<Conversation>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("mock server address").port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for conversation in conversations {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || serve(stream, conversation, &recorded));
            }
        });

        Self { port, requests }
    }

    /// Serve a single connection.
    pub fn single(conversation: Conversation) -> Self {
        Self::start(vec![conversation])
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client config pointing at this server.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port)
            .with_connect_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5))
    }

    /// Requests received so far, parsed.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn serve(stream: TcpStream, conversation: Conversation, recorded: &Mutex<Vec<Value>>) {
    stream.set_nodelay(true).expect("set nodelay");
    let mut reader = BufReader::new(stream.try_clone().expect("clone mock stream"));
    let mut writer = stream;
    let mut id = String::new();

    for exchange in conversation {
        if exchange.read_request {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let request: Value =
                serde_json::from_str(line.trim_end()).expect("client sent invalid JSON");
            id = request["id"].as_str().unwrap_or_default().to_string();
            recorded.lock().expect("requests lock").push(request);
        }

        let mut pending = Vec::new();
        for reply in exchange.replies {
            match reply {
                Reply::Line(line) => {
                    pending.extend_from_slice(line.replace(ID, &id).as_bytes());
                    pending.push(b'\n');
                }
                Reply::Raw(bytes) => pending.extend_from_slice(&bytes),
                Reply::Sleep(delay) => {
                    if write_out(&mut writer, &mut pending, exchange.chunk).is_err() {
                        return;
                    }
                    thread::sleep(delay);
                }
                Reply::Close => {
                    let _ = write_out(&mut writer, &mut pending, exchange.chunk);
                    return;
                }
            }
        }
        if write_out(&mut writer, &mut pending, exchange.chunk).is_err() {
            return;
        }
    }

    // Script done: hold the connection until the client hangs up.
    let _ = io::copy(&mut reader, &mut io::sink());
}

fn write_out(writer: &mut TcpStream, pending: &mut Vec<u8>, chunk: Option<usize>) -> io::Result<()> {
    let size = chunk.unwrap_or(pending.len().max(1));
    for piece in pending.chunks(size) {
        writer.write_all(piece)?;
        writer.flush()?;
    }
    pending.clear();
    Ok(())
}
