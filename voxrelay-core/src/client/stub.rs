//! `StubTransport`: in-process transport without a real wire protocol.
//!
//! Used by the demo binary and by tests. It keeps the full contract of
//! [`ChatTransport`] observable: connection state, sent messages, media
//! lookup, QR updates and the pairing handshake all behave, they just never
//! leave the process. A real protocol library binds at this seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::client::ChatTransport;
use crate::error::{Result, VoxrelayError};
use crate::event::{
    AudioAttachment, PairingDecision, PairingRequest, QrUpdate, QuoteRef, SendReceipt,
    SessionEvent,
};
use crate::jid::Jid;
use crate::store::DeviceRecord;

/// Broadcast capacity: 256 session events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// How long the transport waits for an operator pairing decision before
/// applying the default policy (accept).
const PAIR_DECISION_WINDOW: Duration = Duration::from_secs(3);

/// A message recorded by the stub instead of hitting the wire.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: Jid,
    pub body: String,
    pub quote: Option<QuoteRef>,
}

struct Inner {
    device: DeviceRecord,
    request_full_sync: bool,
    connected: AtomicBool,
    paired: AtomicBool,
    event_tx: broadcast::Sender<SessionEvent>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    qr_tx: Mutex<Option<mpsc::Sender<QrUpdate>>>,
    pairing_tx: mpsc::Sender<PairingRequest>,
    pairing_rx: Mutex<Option<mpsc::Receiver<PairingRequest>>>,
}

/// In-process [`ChatTransport`] implementation.
#[derive(Clone)]
pub struct StubTransport {
    inner: Arc<Inner>,
}

impl StubTransport {
    pub fn new(device: DeviceRecord, request_full_sync: bool) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        // Capacity 1 mirrors a single pending operator decision.
        let (pairing_tx, pairing_rx) = mpsc::channel(1);
        let paired = device.jid.is_some();

        Self {
            inner: Arc::new(Inner {
                device,
                request_full_sync,
                connected: AtomicBool::new(false),
                paired: AtomicBool::new(paired),
                event_tx,
                media: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                qr_tx: Mutex::new(None),
                pairing_tx,
                pairing_rx: Mutex::new(Some(pairing_rx)),
            }),
        }
    }

    /// Register media bytes retrievable through `download_media`.
    pub fn insert_media(&self, media_id: impl Into<String>, bytes: Vec<u8>) {
        self.inner.media.lock().insert(media_id.into(), bytes);
    }

    /// Inject a session event, as the protocol layer would on traffic.
    pub fn emit(&self, event: SessionEvent) {
        // Send fails only when no subscriber exists; events are fire-and-forget.
        let _ = self.inner.event_tx.send(event);
    }

    /// Messages recorded so far, oldest first.
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.inner.sent.lock().clone()
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device.id
    }

    /// Run a pairing handshake and wait for the outcome.
    ///
    /// Posts a [`PairingRequest`] to the application and resolves it with the
    /// operator decision, or with the default policy (accept) once the
    /// decision window elapses.
    pub async fn begin_pairing(
        &self,
        jid: Jid,
        platform: &str,
        business_name: &str,
    ) -> PairingDecision {
        self.inner
            .run_pairing(jid, platform.to_string(), business_name.to_string())
            .await
    }
}

impl Inner {
    async fn run_pairing(&self, jid: Jid, platform: String, business_name: String) -> PairingDecision {
        let (decision_tx, decision_rx) = oneshot::channel();
        let request = PairingRequest {
            jid: jid.clone(),
            platform,
            business_name,
            decision: decision_tx,
        };

        if self.pairing_tx.send(request).await.is_err() {
            // No listener; fall through to the default policy.
            debug!("no pairing listener registered, applying default policy");
        }

        let decision = match tokio::time::timeout(PAIR_DECISION_WINDOW, decision_rx).await {
            Ok(Ok(PairingDecision::Reject)) => PairingDecision::Reject,
            // Timeout, dropped sender, or an explicit accept.
            _ => PairingDecision::Accept,
        };

        match decision {
            PairingDecision::Accept => {
                self.paired.store(true, Ordering::SeqCst);
                info!(%jid, "pairing accepted");
            }
            PairingDecision::Reject => {
                info!(%jid, "pairing rejected");
            }
        }
        decision
    }

    fn record_send(&self, to: &Jid, body: &str, quote: Option<QuoteRef>) -> Result<SendReceipt> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoxrelayError::NotConnected);
        }
        let receipt = SendReceipt {
            message_id: generate_message_id(),
            timestamp: Utc::now(),
        };
        self.sent.lock().push(OutboundMessage {
            to: to.clone(),
            body: body.to_string(),
            quote,
        });
        Ok(receipt)
    }
}

#[async_trait]
impl ChatTransport for StubTransport {
    async fn connect(&self) -> Result<()> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return Err(VoxrelayError::AlreadyConnected);
        }
        if self.inner.request_full_sync {
            info!("requesting full history sync on login");
        }
        info!(device_id = %self.inner.device.id, "transport connected");
        let _ = self.inner.event_tx.send(SessionEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            info!("transport disconnected");
        }
    }

    async fn logout(&self) -> Result<()> {
        self.inner.paired.store(false, Ordering::SeqCst);
        let _ = self.inner.event_tx.send(SessionEvent::LoggedOut);
        self.disconnect().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn is_paired(&self) -> bool {
        self.inner.paired.load(Ordering::SeqCst)
    }

    async fn send_text(&self, to: &Jid, body: &str) -> Result<SendReceipt> {
        self.inner.record_send(to, body, None)
    }

    async fn send_quoted_text(
        &self,
        to: &Jid,
        body: &str,
        quote: &QuoteRef,
    ) -> Result<SendReceipt> {
        self.inner.record_send(to, body, Some(quote.clone()))
    }

    async fn download_media(&self, attachment: &AudioAttachment) -> Result<Vec<u8>> {
        self.inner
            .media
            .lock()
            .get(&attachment.media_id)
            .cloned()
            .ok_or_else(|| {
                VoxrelayError::MediaDownload(format!(
                    "no media stored under id {:?}",
                    attachment.media_id
                ))
            })
    }

    async fn pair_phone(&self, number: &str) -> Result<String> {
        let digits = number.strip_prefix('+').unwrap_or(number);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(VoxrelayError::Pairing(format!(
                "invalid phone number {number:?}"
            )));
        }

        let code = generate_linking_code();
        let jid = Jid::on_default_server(digits);
        let inner = Arc::clone(&self.inner);
        // The handshake runs in the background so the command loop stays free
        // to read the operator's r / a decision.
        tokio::spawn(async move {
            inner.run_pairing(jid, "phone".to_string(), String::new()).await;
        });
        Ok(code)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    fn qr_updates(&self) -> Result<mpsc::Receiver<QrUpdate>> {
        if self.is_paired() {
            return Err(VoxrelayError::AlreadyPaired);
        }
        let (tx, rx) = mpsc::channel(8);
        // Seed one code immediately; later codes arrive as the stub rotates them.
        let _ = tx.try_send(QrUpdate::Code(generate_qr_code()));
        *self.inner.qr_tx.lock() = Some(tx);
        Ok(rx)
    }

    fn pairing_requests(&self) -> Option<mpsc::Receiver<PairingRequest>> {
        self.inner.pairing_rx.lock().take()
    }
}

fn sample_chars(charset: &[u8], len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

fn generate_message_id() -> String {
    format!("3EB0{}", sample_chars(b"0123456789ABCDEF", 12))
}

/// Phone-linking code, grouped for readability (`XXXX-XXXX`).
fn generate_linking_code() -> String {
    let raw = sample_chars(b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789", 8);
    format!("{}-{}", &raw[..4], &raw[4..])
}

fn generate_qr_code() -> String {
    format!("2@{}", sample_chars(b"abcdefghijklmnopqrstuvwxyz0123456789", 24))
}
