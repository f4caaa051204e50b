//! Session event types delivered over the transport's broadcast channel.
//!
//! `SessionEvent` replaces the callback-registration style of typical protocol
//! libraries with a `tokio::sync::broadcast` subscription, so multiple
//! consumers (dispatcher, logging, tests) can observe the same stream.
//! Pairing requests travel over their own mpsc channel because they carry a
//! one-shot reply sender and cannot be cloned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::jid::Jid;

/// Events emitted by a [`crate::client::ChatTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session is established and the socket is live.
    Connected,
    /// An inbound message, possibly carrying an audio attachment.
    Message(MessageEvent),
    /// Another client took over this session. Terminal.
    StreamReplaced,
    /// The server closed the session. Terminal.
    Disconnected,
    /// The account was unlinked from this device.
    LoggedOut,
}

/// An inbound message with the metadata the dispatcher logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub id: String,
    pub sender: Jid,
    /// Conversation the message arrived in; replies go back here.
    pub chat: Jid,
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
    /// Protocol-level message type, empty when the transport has none.
    pub message_type: String,
    /// Protocol-level category, empty when the transport has none.
    pub category: String,
    pub view_once: bool,
    pub ephemeral: bool,
    pub edit: bool,
    pub text: Option<String>,
    pub audio: Option<AudioAttachment>,
}

/// Reference to a downloadable audio payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAttachment {
    pub media_id: String,
    pub mime_type: String,
    pub duration_secs: Option<u32>,
    /// `true` for a recorded voice message, `false` for an uploaded audio file.
    pub push_to_talk: bool,
}

/// Reference embedded in a quoted reply so the recipient's client renders a
/// threaded quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRef {
    pub message_id: String,
    pub sender: Jid,
}

/// Server acknowledgement for an outbound message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Updates from the QR pairing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrUpdate {
    /// A fresh code to present to the operator.
    Code(String),
    /// Channel outcome (`"success"`, `"timeout"`, …).
    Outcome(String),
}

/// Operator decision for a pending pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingDecision {
    Accept,
    Reject,
}

/// A pairing handshake posted by the transport.
///
/// The application answers through `decision`; the transport applies its
/// default policy if no answer arrives within the decision window.
#[derive(Debug)]
pub struct PairingRequest {
    pub jid: Jid,
    pub platform: String,
    pub business_name: String,
    pub decision: oneshot::Sender<PairingDecision>,
}
