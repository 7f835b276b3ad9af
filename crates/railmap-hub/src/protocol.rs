//! JSON hub protocol framing.
//!
//! Every record is a JSON object terminated by the `0x1E` record separator.
//! A connection starts with a handshake record in each direction; after
//! that the `type` field tells messages apart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::HubError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

#[derive(Debug, Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

/// The client's opening record.
pub fn handshake_request() -> String {
    let request = HandshakeRequest {
        protocol: "json",
        version: 1,
    };
    // Serializing two plain fields cannot fail.
    let json = serde_json::to_string(&request).unwrap_or_default();
    format!("{json}{RECORD_SEPARATOR}")
}

/// Check the server's handshake record.
pub fn parse_handshake_response(record: &str) -> Result<(), HubError> {
    let response: HandshakeResponse = serde_json::from_str(record)
        .map_err(|e| HubError::Handshake(format!("unreadable response: {e}")))?;
    match response.error {
        Some(error) => Err(HubError::Handshake(error)),
        None => Ok(()),
    }
}

/// Split a text frame into its records. Frames may carry several records.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingInvocation<'a> {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: &'a str,
    target: &'a str,
    arguments: &'a [Value],
}

/// Encode a call that expects a completion.
pub fn encode_invocation(
    invocation_id: &str,
    target: &str,
    arguments: &[Value],
) -> Result<String, HubError> {
    let json = serde_json::to_string(&OutgoingInvocation {
        kind: TYPE_INVOCATION,
        invocation_id,
        target,
        arguments,
    })?;
    Ok(format!("{json}{RECORD_SEPARATOR}"))
}

pub fn encode_ping() -> String {
    format!("{{\"type\":{TYPE_PING}}}{RECORD_SEPARATOR}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    result: Option<Value>,
    error: Option<String>,
    allow_reconnect: Option<bool>,
}

/// A decoded inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Server-to-client push (`ServersReceived`, `TrainsReceived`, ...).
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of a client call.
    Completion {
        invocation_id: String,
        result: Result<Value, String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// A message type this client does not use.
    Ignored(u8),
}

impl HubMessage {
    pub fn parse(record: &str) -> Result<Self, HubError> {
        let raw: RawMessage = serde_json::from_str(record)?;

        let message = match raw.kind {
            TYPE_INVOCATION => HubMessage::Invocation {
                target: raw
                    .target
                    .ok_or_else(|| HubError::Protocol("invocation without target".into()))?,
                arguments: raw.arguments,
            },
            TYPE_COMPLETION => {
                let invocation_id = raw
                    .invocation_id
                    .ok_or_else(|| HubError::Protocol("completion without id".into()))?;
                let result = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                HubMessage::Completion {
                    invocation_id,
                    result,
                }
            }
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => HubMessage::Ignored(other),
        };
        Ok(message)
    }
}

struct PendingInvocation {
    method: String,
    response_tx: oneshot::Sender<Result<Value, HubError>>,
    created_at: Instant,
}

/// Correlates outgoing invocation ids with the callers waiting on them.
#[derive(Default)]
pub struct InvocationTracker {
    pending: HashMap<String, PendingInvocation>,
}

impl InvocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register a waiting caller under a fresh invocation id.
    pub fn register(
        &mut self,
        method: &str,
        response_tx: oneshot::Sender<Result<Value, HubError>>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.pending.insert(
            id.clone(),
            PendingInvocation {
                method: method.to_string(),
                response_tx,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Deliver a completion. Returns false if the id is unknown.
    pub fn complete(&mut self, invocation_id: &str, result: Result<Value, String>) -> bool {
        let Some(pending) = self.pending.remove(invocation_id) else {
            return false;
        };
        let result = result.map_err(|message| HubError::Invocation {
            method: pending.method,
            message,
        });
        // The caller may have stopped waiting.
        let _ = pending.response_tx.send(result);
        true
    }

    /// Fail a single invocation, e.g. when writing it to the socket failed.
    pub fn fail(&mut self, invocation_id: &str, error: HubError) {
        if let Some(pending) = self.pending.remove(invocation_id) {
            let _ = pending.response_tx.send(Err(error));
        }
    }

    /// Fail every pending invocation with [`HubError::ConnectionLost`].
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.response_tx.send(Err(HubError::ConnectionLost));
        }
        count
    }

    /// Drop invocations older than `timeout`. Returns their methods.
    pub fn expire(&mut self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.created_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|pending| {
                let method = pending.method.clone();
                let _ = pending.response_tx.send(Err(HubError::ConnectionLost));
                method
            })
            .collect()
    }
}
