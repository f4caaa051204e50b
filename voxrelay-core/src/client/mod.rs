//! Chat transport abstraction.
//!
//! The wire protocol (session handshake, encryption, media hosting) lives
//! behind [`ChatTransport`] so the dispatcher and the operator command loop
//! never touch protocol details. Events arrive over a broadcast subscription
//! rather than a registered callback; pairing runs as a message-passing
//! handshake with a reply channel and a transport-side default policy.

pub mod stub;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::event::{AudioAttachment, PairingRequest, QrUpdate, QuoteRef, SendReceipt, SessionEvent};
use crate::jid::Jid;

/// Capability set consumed by the dispatcher and the command loop.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the session.
    ///
    /// # Errors
    /// - [`crate::VoxrelayError::AlreadyConnected`] if the session is live.
    async fn connect(&self) -> Result<()>;

    /// Close the session. Idempotent.
    async fn disconnect(&self);

    /// Unlink the account from this device.
    async fn logout(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Whether the stored device is linked to an account.
    fn is_paired(&self) -> bool;

    /// Send a plain text message.
    async fn send_text(&self, to: &Jid, body: &str) -> Result<SendReceipt>;

    /// Send a text message quoting an earlier message.
    async fn send_quoted_text(&self, to: &Jid, body: &str, quote: &QuoteRef)
        -> Result<SendReceipt>;

    /// Fetch the raw bytes of an audio attachment.
    async fn download_media(&self, attachment: &AudioAttachment) -> Result<Vec<u8>>;

    /// Request a phone-linking code for `number`.
    async fn pair_phone(&self, number: &str) -> Result<String>;

    /// Subscribe to session events. Subscribe before `connect()` to observe
    /// the full stream.
    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent>;

    /// Receiver for QR pairing updates.
    ///
    /// # Errors
    /// - [`crate::VoxrelayError::AlreadyPaired`] when the device is already
    ///   linked and no QR flow will run.
    fn qr_updates(&self) -> Result<mpsc::Receiver<QrUpdate>>;

    /// Take the pairing-request channel. Yields `Some` exactly once.
    fn pairing_requests(&self) -> Option<mpsc::Receiver<PairingRequest>>;
}
