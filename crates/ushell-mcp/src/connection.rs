//! TCP connection to an MCP server.
//!
//! A [`Connection`] owns the socket and the frame buffer. It exposes blocking
//! primitives only; the request/response logic lives in
//! [`Session`](crate::Session).

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{McpError, Result};
use crate::frame::FrameDecoder;
use crate::message::{Message, Request, RequestId};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 4096;

/// Deadline `timeout` from now, or `None` when it lies beyond what
/// [`Instant`] can represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// A live connection to an MCP server.
///
/// The protocol allows a single outstanding request; `send` refuses a second
/// one until the first reaches a terminal message. After a timeout or a
/// correlation failure the connection is *desynchronized* and refuses new
/// requests until [`drain`](Self::drain)ed or closed.
pub struct Connection {
    /// `host:port` as given to `connect`.
    addr: String,
    /// `None` once closed or after a fatal I/O error.
    stream: Option<TcpStream>,
    /// Bytes received but not yet returned as frames.
    decoder: FrameDecoder,
    /// A message read ahead and handed back for the next receive.
    pushback: Option<Message>,
    /// Request awaiting its terminal message.
    outstanding: Option<RequestId>,
    /// Stale messages for an abandoned request may still arrive.
    desynchronized: bool,
}

impl Connection {
    /// Open a TCP connection.
    ///
    /// Every address `host` resolves to is tried in turn, each bounded by
    /// `timeout`.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", host, port);

        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|e| McpError::connection(&addr, e))?;

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| McpError::connection(&addr, e))?;
                    tracing::info!(addr = %addr, peer = %candidate, "connected to MCP server");
                    return Ok(Self::from_stream(addr, stream));
                }
                Err(e) => {
                    tracing::debug!(peer = %candidate, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "host resolved to no addresses")
        });
        Err(McpError::connection(addr, source))
    }

    fn from_stream(addr: String, stream: TcpStream) -> Self {
        Self {
            addr,
            stream: Some(stream),
            decoder: FrameDecoder::new(),
            pushback: None,
            outstanding: None,
            desynchronized: false,
        }
    }

    /// The `host:port` this connection was opened to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether the socket is still held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// The request currently awaiting a terminal message.
    pub fn outstanding(&self) -> Option<RequestId> {
        self.outstanding
    }

    /// Whether new requests are refused until a drain or reconnect.
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Write one request frame.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(McpError::ConnectionClosed);
        };
        if self.desynchronized {
            return Err(McpError::Desynchronized);
        }
        if let Some(id) = self.outstanding {
            return Err(McpError::RequestOutstanding(id.to_string()));
        }

        let mut line = request.to_line()?;
        tracing::trace!(json = %line, "sending MCP request");
        line.push('\n');

        if let Err(e) = stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.flush())
        {
            tracing::warn!(addr = %self.addr, error = %e, "write failed, dropping connection");
            self.drop_stream();
            return Err(McpError::Io(e));
        }

        tracing::debug!(id = %request.id, method = request.method(), "sent MCP request");
        self.outstanding = Some(request.id);
        Ok(())
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// Buffered frames are returned without touching the socket.
    pub fn receive_next(&mut self, timeout: Duration) -> Result<Message> {
        self.receive_until(deadline_after(timeout), timeout)
    }

    /// Wait until `deadline` for the next message, or indefinitely when there
    /// is none. `budget` is only used to report the timeout.
    pub(crate) fn receive_until(
        &mut self,
        deadline: Option<Instant>,
        budget: Duration,
    ) -> Result<Message> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(message) = self.pushback.take() {
                return Ok(message);
            }

            if let Some(frame) = self.decoder.next_frame() {
                let message = Message::decode(&frame);
                tracing::trace!(
                    kind = message.kind(),
                    json = %String::from_utf8_lossy(&frame),
                    "received MCP message"
                );
                return Ok(message);
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(McpError::ConnectionClosed);
            };

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(McpError::Timeout(budget));
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            stream.set_read_timeout(remaining)?;

            match stream.read(&mut chunk) {
                Ok(0) => {
                    let trailing = self.decoder.finish();
                    if trailing > 0 {
                        tracing::warn!(
                            addr = %self.addr,
                            trailing_bytes = trailing,
                            "connection closed mid-frame, discarding partial data"
                        );
                    } else {
                        tracing::debug!(addr = %self.addr, "connection closed by peer");
                    }
                    self.drop_stream();
                    return Err(McpError::ConnectionClosed);
                }
                Ok(n) => self.decoder.extend(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(addr = %self.addr, error = %e, "read failed, dropping connection");
                    self.drop_stream();
                    return Err(McpError::Io(e));
                }
            }
        }
    }

    /// Hand a message back so the next receive returns it first.
    pub(crate) fn unread(&mut self, message: Message) {
        debug_assert!(self.pushback.is_none(), "only one message can be pushed back");
        self.pushback = Some(message);
    }

    /// The outstanding request reached its terminal message.
    pub(crate) fn complete(&mut self, id: RequestId) {
        if self.outstanding == Some(id) {
            self.outstanding = None;
        }
    }

    /// The outstanding request was abandoned without a matching terminal.
    pub(crate) fn desynchronize(&mut self) {
        tracing::warn!(
            addr = %self.addr,
            outstanding = ?self.outstanding.map(|id| id.to_string()),
            "connection desynchronized"
        );
        self.desynchronized = true;
    }

    /// Discard inbound messages until none arrives for `quiet`, then accept
    /// requests again.
    ///
    /// Returns how many messages were discarded. Reopening the connection is
    /// the more reliable recovery; a server that is still working on the
    /// abandoned request can outlast any quiet period.
    pub fn drain(&mut self, quiet: Duration) -> Result<usize> {
        let mut discarded = 0;
        loop {
            match self.receive_next(quiet) {
                Ok(message) => {
                    tracing::debug!(kind = message.kind(), "discarding stale message");
                    discarded += 1;
                }
                Err(McpError::Timeout(_)) => break,
                Err(e) => return Err(e),
            }
        }

        tracing::info!(addr = %self.addr, discarded, "connection drained");
        self.outstanding = None;
        self.desynchronized = false;
        Ok(discarded)
    }

    /// A handle that can close this connection from another thread.
    ///
    /// Closing through the handle makes a blocked receive return
    /// [`McpError::ConnectionClosed`].
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let stream = self.stream.as_ref().ok_or(McpError::ConnectionClosed)?;
        Ok(ShutdownHandle {
            stream: Arc::new(stream.try_clone()?),
        })
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.stream.is_some() {
            tracing::info!(addr = %self.addr, "closing MCP connection");
        }
        self.drop_stream();
        self.decoder.finish();
        self.pushback = None;
    }

    fn drop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.outstanding = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .field("outstanding", &self.outstanding)
            .field("desynchronized", &self.desynchronized)
            .finish()
    }
}

/// Closes a [`Connection`] from outside the thread that owns it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stream: Arc<TcpStream>,
}

impl ShutdownHandle {
    /// Shut the socket down in both directions. Idempotent.
    pub fn close(&self) {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => tracing::debug!("connection shut down via handle"),
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => tracing::debug!(error = %e, "shutdown via handle failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    use crate::message::RequestParams;

    /// Accept one client and run `script` against it on a background thread.
    fn serve<F>(script: F) -> u16
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            script(stream);
        });
        port
    }

    /// Keep the socket open until the client goes away.
    fn hold(stream: TcpStream) {
        let mut sink = Vec::new();
        let _ = (&stream).read_to_end(&mut sink);
    }

    fn connect(port: u16) -> Connection {
        Connection::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = Connection::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap_err();
        match err {
            McpError::Connection { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{}", port)),
            other => panic!("Expected connection error, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_unresolvable_host() {
        let err = Connection::connect("no-such-host.invalid", 9000, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, McpError::Connection { .. }));
    }

    #[test]
    fn test_receive_one_byte_at_a_time() {
        let port = serve(|mut stream| {
            for byte in b"{\"type\":\"notification\",\"event\":\"e\",\"message\":\"m\"}\n" {
                stream.write_all(&[*byte]).unwrap();
                stream.flush().unwrap();
            }
            hold(stream);
        });

        let mut conn = connect(port);
        let message = conn.receive_next(Duration::from_secs(5)).unwrap();
        assert_eq!(message.kind(), "notification");
    }

    #[test]
    fn test_timeout_keeps_connection_open() {
        let port = serve(hold);
        let mut conn = connect(port);
        let err = conn.receive_next(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, McpError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(conn.is_open());
    }

    #[test]
    fn test_eof_discards_partial_frame() {
        let port = serve(|mut stream| {
            stream
                .write_all(b"{\"type\":\"error\",\"id\":\"1\",\"error\":\"x\"}\n{\"type\":\"resp")
                .unwrap();
        });

        let mut conn = connect(port);
        let first = conn.receive_next(Duration::from_secs(5)).unwrap();
        assert_eq!(first.kind(), "error");
        let err = conn.receive_next(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed));
        assert!(!conn.is_open());
    }

    #[test]
    fn test_send_refused_while_outstanding() {
        let port = serve(|stream| {
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            assert!(line.ends_with('\n'));
            hold(stream);
        });

        let mut conn = connect(port);
        conn.send(&Request::new(RequestId::new(1), RequestParams::initialize()))
            .unwrap();
        assert_eq!(conn.outstanding(), Some(RequestId::new(1)));

        let err = conn
            .send(&Request::new(RequestId::new(2), RequestParams::list_tools()))
            .unwrap_err();
        assert!(matches!(err, McpError::RequestOutstanding(id) if id == "1"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let port = serve(hold);
        let mut conn = connect(port);
        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert!(matches!(
            conn.receive_next(Duration::from_millis(10)),
            Err(McpError::ConnectionClosed)
        ));
        assert!(matches!(
            conn.send(&Request::new(RequestId::new(1), RequestParams::initialize())),
            Err(McpError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_shutdown_handle_unblocks_receive() {
        let port = serve(hold);
        let mut conn = connect(port);
        let handle = conn.shutdown_handle().unwrap();

        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.close();
            handle.close();
        });

        let err = conn.receive_next(Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed));
        closer.join().unwrap();
    }

    #[test]
    fn test_drain_clears_desynchronized_state() {
        let port = serve(|mut stream| {
            stream
                .write_all(b"{\"type\":\"notification\",\"event\":\"tool_completed\",\"message\":\"x\"}\n")
                .unwrap();
            hold(stream);
        });

        let mut conn = connect(port);
        conn.desynchronize();
        assert!(matches!(
            conn.send(&Request::new(RequestId::new(1), RequestParams::initialize())),
            Err(McpError::Desynchronized)
        ));

        let discarded = conn.drain(Duration::from_millis(100)).unwrap();
        assert_eq!(discarded, 1);
        assert!(!conn.is_desynchronized());
    }

    #[test]
    fn test_unrepresentable_timeout_blocks_without_deadline() {
        assert!(deadline_after(Duration::MAX).is_none());

        let port = serve(|mut stream| {
            thread::sleep(Duration::from_millis(50));
            stream
                .write_all(b"{\"type\":\"notification\",\"event\":\"e\",\"message\":\"m\"}\n")
                .unwrap();
            hold(stream);
        });

        let mut conn = connect(port);
        let message = conn.receive_next(Duration::MAX).unwrap();
        assert_eq!(message.kind(), "notification");
    }

    #[test]
    fn test_pushback_is_returned_first() {
        let port = serve(hold);
        let mut conn = connect(port);
        conn.unread(Message::Error {
            id: None,
            error: "later".into(),
        });
        let message = conn.receive_next(Duration::from_millis(10)).unwrap();
        assert_eq!(message.kind(), "error");
    }
}
