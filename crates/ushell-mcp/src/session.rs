//! Per-request state machine.
//!
//! A [`Session`] follows one issued request from send to terminal message:
//!
//! ```text
//!            notification            response (id matches)
//! Pending ───────────────▶ InProgress ─────────────────────▶ Completed
//!    │                      │  ▲   │    error (id matches)
//!    │                      └──┘   ├──────────────────────▶ Failed
//!    │                             │    mismatched id
//!    └─── same edges ──────────────├──────────────────────▶ Failed + CorrelationError
//!                                  │    deadline
//!                                  ├──────────────────────▶ TimedOut
//!                                  │    EOF / shutdown / IO
//!                                  └──────────────────────▶ ConnectionLost
//! ```
//!
//! The session mutably borrows its [`Connection`], so no other request can be
//! issued on it while the session is alive.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::connection::{Connection, deadline_after};
use crate::error::{McpError, Result};
use crate::message::{JsonObject, Message, Notification, RequestId};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Request sent, nothing received yet.
    Pending,
    /// At least one notification received, no terminal yet.
    InProgress,
    /// Matching response received.
    Completed,
    /// Matching error received, correlation lost, or aborted.
    Failed,
    /// Deadline passed without a terminal message.
    TimedOut,
    /// The connection closed before a terminal message.
    ConnectionLost,
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::ConnectionLost => "connection lost",
        };
        f.write_str(name)
    }
}

/// What to do when a frame fails to decode mid-session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// End the session with [`McpError::Decode`].
    #[default]
    Abort,
    /// Log the frame and keep waiting for the terminal message.
    Skip,
}

/// One classified message, as returned by [`Session::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Progress; more messages follow.
    Notification(Notification),
    /// An undecodable frame. The session state is unchanged; call
    /// [`Session::abort`] or keep stepping.
    Malformed {
        /// Frame text.
        raw: String,
        /// Why decoding failed.
        cause: String,
    },
    /// Terminal success.
    Completed(JsonObject),
    /// Terminal failure reported by the server.
    Failed(String),
}

impl Step {
    /// Whether this step ended the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Terminal outcome of a session that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// The response's `result` object.
    Completed(JsonObject),
    /// The server's error text.
    Failed(String),
}

/// A finished session: every notification in wire order, then the terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    /// Id of the request.
    pub id: RequestId,
    /// Notifications received before the terminal message.
    pub notifications: Vec<Notification>,
    /// The terminal outcome.
    pub terminal: Terminal,
}

/// The exchange for one outstanding request.
pub struct Session<'c> {
    connection: &'c mut Connection,
    id: RequestId,
    method: &'static str,
    state: SessionState,
    timeout: Duration,
    deadline: Option<Instant>,
    notifications: usize,
}

impl<'c> Session<'c> {
    /// Track request `id`, already sent on `connection`.
    ///
    /// `timeout` bounds the whole exchange, starting now. A timeout too large
    /// to form a deadline waits without one.
    pub fn new(
        connection: &'c mut Connection,
        id: RequestId,
        method: &'static str,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            id,
            method,
            state: SessionState::Pending,
            timeout,
            deadline: deadline_after(timeout),
            notifications: 0,
        }
    }

    /// Id of the request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Method of the request.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Notifications received so far.
    pub fn notifications_seen(&self) -> usize {
        self.notifications
    }

    /// Wait for and classify the next message.
    ///
    /// Transport failures come back as errors after moving the session to
    /// `TimedOut` or `ConnectionLost`; a mismatched terminal id comes back as
    /// [`McpError::Correlation`] after moving it to `Failed`.
    pub fn step(&mut self) -> Result<Step> {
        if self.state.is_terminal() {
            return Err(McpError::SessionFinished(self.state));
        }

        let message = match self.connection.receive_until(self.deadline, self.timeout) {
            Ok(message) => message,
            Err(McpError::Timeout(budget)) => {
                tracing::warn!(
                    id = %self.id,
                    method = self.method,
                    timeout_ms = budget.as_millis() as u64,
                    "request timed out"
                );
                self.state = SessionState::TimedOut;
                self.connection.desynchronize();
                return Err(McpError::Timeout(budget));
            }
            Err(e) => {
                tracing::warn!(id = %self.id, method = self.method, error = %e, "connection lost");
                self.state = SessionState::ConnectionLost;
                return Err(e);
            }
        };

        match message {
            Message::Notification(notification) => {
                self.state = SessionState::InProgress;
                self.notifications += 1;
                tracing::debug!(
                    id = %self.id,
                    event = %notification.event,
                    message = %notification.message,
                    "notification"
                );
                Ok(Step::Notification(notification))
            }
            Message::Malformed { raw, cause } => {
                tracing::warn!(id = %self.id, cause = %cause, raw = %raw, "malformed frame");
                Ok(Step::Malformed { raw, cause })
            }
            Message::Response { id, result } => {
                if !self.id.matches(&id) {
                    return Err(self.lose_correlation(id));
                }
                tracing::debug!(id = %self.id, method = self.method, "request completed");
                self.finish(SessionState::Completed);
                Ok(Step::Completed(result))
            }
            Message::Error { id: Some(id), .. } if !self.id.matches(&id) => {
                Err(self.lose_correlation(id))
            }
            Message::Error { id, error } => {
                if id.is_none() {
                    tracing::warn!(id = %self.id, error = %error, "unattributed server error");
                } else {
                    tracing::debug!(id = %self.id, method = self.method, error = %error, "request failed");
                }
                self.finish(SessionState::Failed);
                Ok(Step::Failed(error))
            }
        }
    }

    /// Give up on the request, e.g. after a malformed frame.
    ///
    /// Its terminal message may still arrive, so the connection is left
    /// desynchronized.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(id = %self.id, method = self.method, "session aborted");
            self.state = SessionState::Failed;
            self.connection.desynchronize();
        }
    }

    /// Step until a terminal message, reporting each notification to
    /// `on_notification` as it arrives.
    pub fn run<F>(mut self, policy: MalformedPolicy, mut on_notification: F) -> Result<Finished>
    where
        F: FnMut(&Notification),
    {
        let mut notifications = Vec::new();
        loop {
            let terminal = match self.step()? {
                Step::Notification(notification) => {
                    on_notification(&notification);
                    notifications.push(notification);
                    continue;
                }
                Step::Malformed { raw, cause } => match policy {
                    MalformedPolicy::Abort => {
                        self.abort();
                        return Err(McpError::decode(raw, cause));
                    }
                    MalformedPolicy::Skip => continue,
                },
                Step::Completed(result) => Terminal::Completed(result),
                Step::Failed(error) => Terminal::Failed(error),
            };

            return Ok(Finished {
                id: self.id,
                notifications,
                terminal,
            });
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.connection.complete(self.id);
    }

    fn lose_correlation(&mut self, actual: String) -> McpError {
        tracing::warn!(expected = %self.id, actual = %actual, "terminal message id mismatch");
        self.state = SessionState::Failed;
        self.connection.desynchronize();
        McpError::correlation(self.id.to_string(), actual)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        // Dropped mid-exchange: the rest of the reply is still on the wire.
        if !self.state.is_terminal() {
            self.connection.desynchronize();
        }
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("notifications", &self.notifications)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::InProgress.is_terminal());
        for state in [
            SessionState::Completed,
            SessionState::Failed,
            SessionState::TimedOut,
            SessionState::ConnectionLost,
        ] {
            assert!(state.is_terminal(), "{} should be terminal", state);
        }
    }

    #[test]
    fn test_step_terminality() {
        assert!(Step::Completed(JsonObject::new()).is_terminal());
        assert!(Step::Failed("x".into()).is_terminal());
        assert!(
            !Step::Notification(Notification {
                event: "tool_started".into(),
                message: "pwd".into()
            })
            .is_terminal()
        );
    }

    #[test]
    fn test_malformed_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: MalformedPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"skip\"").unwrap();
        assert_eq!(w.policy, MalformedPolicy::Skip);
        assert_eq!(MalformedPolicy::default(), MalformedPolicy::Abort);
    }
}
