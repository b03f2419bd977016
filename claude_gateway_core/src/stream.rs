//! Per-invocation output pump.
//!
//! One task per invocation reads the agent's stdout, sniffs the session id the
//! agent announces in its `system` message, and forwards every line unchanged
//! to the consumer's [`OutputStream`]. However the output ends (EOF, read
//! failure, cancellation, or the consumer dropping the stream) the task reaps
//! the process and removes the registry entry exactly once before emitting the
//! terminal event.

use crate::error::GatewayError;
use crate::lifecycle::Lifecycle;
use crate::registry::ProcessRegistry;
use crate::runner::{AgentLines, AgentProcess};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::{
    pin::Pin,
    process::ExitStatus,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Characters of each output line echoed at debug level.
const LINE_LOG_CHARS: usize = 200;

/// One item of an invocation's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A raw stdout line, forwarded verbatim.
    Line(String),
    /// The agent exited on its own after all output was delivered.
    Done { id: String },
    /// Reading output failed; the invocation was torn down.
    Error { message: String },
    /// The invocation was cancelled by id.
    Cancelled { id: String },
}

impl OutputEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutputEvent::Line(_))
    }
}

/// Consumer side of an invocation's output.
///
/// Dropping it before the end counts as abandoning the invocation: the agent
/// is terminated and its registry entry released.
pub struct OutputStream {
    inner: ReceiverStream<OutputEvent>,
}

impl OutputStream {
    fn new(rx: mpsc::Receiver<OutputEvent>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for OutputStream {
    type Item = OutputEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OutputEvent>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Two-stage filter for the agent's `{"type":"system", "session_id": …}` line.
///
/// The substring check keeps JSON parsing off the hot path; any parse problem
/// simply means "not found".
#[derive(Debug, Default)]
pub struct SessionIdSniffer {
    found: bool,
}

#[derive(Deserialize)]
struct SystemMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    session_id: Option<String>,
}

impl SessionIdSniffer {
    pub fn inspect(&mut self, line: &str) -> Option<String> {
        if self.found || !line.contains(r#""type":"system""#) || !line.contains(r#""session_id""#)
        {
            return None;
        }
        let message: SystemMessage = serde_json::from_str(line).ok()?;
        if message.kind != "system" {
            return None;
        }
        let session_id = message.session_id.filter(|s| !s.is_empty())?;
        self.found = true;
        Some(session_id)
    }
}

enum Ending {
    Eof,
    Cancelled,
    Abandoned,
    Failed(GatewayError),
}

/// Removes the registry entry if the pump task unwinds before doing it itself.
struct CleanupGuard {
    registry: ProcessRegistry,
    lifecycle: Lifecycle,
    id: String,
}

impl CleanupGuard {
    fn run(&self) {
        self.lifecycle.mark_terminated();
        self.registry.remove(&self.id);
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// Everything the pump needs besides the process itself.
pub struct StreamAdapter {
    pub id: String,
    pub registry: ProcessRegistry,
    pub lifecycle: Lifecycle,
    pub cancel_token: CancellationToken,
    pub grace_period: Duration,
}

impl StreamAdapter {
    /// Start pumping `lines` in a background task and return the consumer side.
    pub fn spawn(self, process: AgentProcess, lines: AgentLines, capacity: usize) -> OutputStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(self.pump(process, lines, tx));
        OutputStream::new(rx)
    }

    async fn pump(
        self,
        mut process: AgentProcess,
        mut lines: AgentLines,
        tx: mpsc::Sender<OutputEvent>,
    ) {
        let guard = CleanupGuard {
            registry: self.registry.clone(),
            lifecycle: self.lifecycle.clone(),
            id: self.id.clone(),
        };
        let mut sniffer = SessionIdSniffer::default();

        let ending = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break Ending::Cancelled,
                _ = tx.closed() => break Ending::Abandoned,
                next = lines.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    if line.len() > LINE_LOG_CHARS {
                        let head: String = line.chars().take(LINE_LOG_CHARS).collect();
                        debug!(process_id = %self.id, "Agent output: {}...", head);
                    } else {
                        debug!(process_id = %self.id, "Agent output: {}", line);
                    }

                    if let Some(session_id) = sniffer.inspect(&line)
                        && self.registry.update_session_id(&self.id, &session_id)
                    {
                        info!(process_id = %self.id, session_id = %session_id, "Agent session id discovered");
                    }

                    let sent = tokio::select! {
                        biased;
                        _ = self.cancel_token.cancelled() => break Ending::Cancelled,
                        sent = tx.send(OutputEvent::Line(line)) => sent,
                    };
                    if sent.is_err() {
                        break Ending::Abandoned;
                    }
                }
                Some(Err(e)) => break Ending::Failed(e.into_output_read()),
                None => break Ending::Eof,
            }
        };

        let terminal = match ending {
            Ending::Eof => {
                let _ = self.lifecycle.mark_completing();
                let exited = tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => None,
                    status = process.wait() => Some(status),
                };
                match exited {
                    Some(status) => {
                        let status = status
                            .inspect_err(|e| warn!(process_id = %self.id, "Failed to wait for agent: {}", e))
                            .ok();
                        process.finish(status).await;
                        Some(OutputEvent::Done {
                            id: self.id.clone(),
                        })
                    }
                    None => {
                        self.shut_down(process, "cancelled after output ended").await;
                        Some(OutputEvent::Cancelled {
                            id: self.id.clone(),
                        })
                    }
                }
            }
            Ending::Cancelled => {
                self.shut_down(process, "cancelled").await;
                Some(OutputEvent::Cancelled {
                    id: self.id.clone(),
                })
            }
            Ending::Abandoned => {
                self.shut_down(process, "consumer went away").await;
                None
            }
            Ending::Failed(e) => {
                error!(process_id = %self.id, "Error reading agent output: {}", e);
                self.shut_down(process, "output read failed").await;
                Some(OutputEvent::Error {
                    message: e.to_string(),
                })
            }
        };

        // Entry goes away before the consumer learns the outcome.
        drop(guard);

        if let Some(event) = terminal {
            let _ = tx.send(event).await;
        }
    }

    async fn shut_down(&self, mut process: AgentProcess, reason: &str) {
        let _ = self.lifecycle.mark_cancelling();
        warn!(process_id = %self.id, pid = process.pid(), reason, "Terminating agent subprocess");
        let status: Option<ExitStatus> = match process.terminate(self.grace_period).await {
            Ok(status) => Some(status),
            Err(e) => {
                error!(process_id = %self.id, "Failed to terminate agent: {}", e);
                None
            }
        };
        process.finish(status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniffer_extracts_session_id_once() {
        let mut sniffer = SessionIdSniffer::default();
        let line = r#"{"type":"system","subtype":"init","session_id":"abc123"}"#;
        assert_eq!(sniffer.inspect(line).as_deref(), Some("abc123"));
        assert_eq!(sniffer.inspect(line), None);
    }

    #[test]
    fn test_sniffer_ignores_other_messages() {
        let mut sniffer = SessionIdSniffer::default();
        assert_eq!(
            sniffer.inspect(r#"{"type":"assistant","session_id":"abc"}"#),
            None
        );
        assert_eq!(sniffer.inspect(r#"{"type":"system"}"#), None);
        // A later valid line is still picked up.
        assert_eq!(
            sniffer
                .inspect(r#"{"type":"system","session_id":"s-2"}"#)
                .as_deref(),
            Some("s-2")
        );
    }

    #[test]
    fn test_sniffer_swallows_malformed_json() {
        let mut sniffer = SessionIdSniffer::default();
        assert_eq!(sniffer.inspect(r#"{"type":"system","session_id": oops"#), None);
        assert_eq!(sniffer.inspect(r#"{"type":"system","session_id":""}"#), None);
        assert_eq!(sniffer.inspect(r#"{"type":"system","session_id":null}"#), None);
        // Text mentioning the markers but nested inside another message type.
        assert_eq!(
            sniffer.inspect(r#"{"type":"user","text":"{\"type\":\"system\",\"session_id\":\"x\"}"}"#),
            None
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(!OutputEvent::Line("x".into()).is_terminal());
        assert!(OutputEvent::Done { id: "a".into() }.is_terminal());
        assert!(OutputEvent::Cancelled { id: "a".into() }.is_terminal());
        assert!(
            OutputEvent::Error {
                message: "boom".into()
            }
            .is_terminal()
        );
    }
}
