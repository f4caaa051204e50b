//! Voxrelay daemon: connects a chat transport, relays voice notes through the
//! transcription endpoint, and answers interactive operator commands on stdin.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod commands;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use voxrelay_core::{
    ChatTransport, DeviceStore, EventDispatcher, Flow, PairingDecision, PairingRequest, QrUpdate,
    StubTransport, Transcriber,
};

#[derive(Debug, Parser)]
#[command(name = "voxrelay", version, about = "Voice-note transcription relay")]
struct Args {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Database dialect for the device store
    #[arg(long, default_value = "sqlite3")]
    db_dialect: String,

    /// Database address for the device store
    #[arg(long, default_value = "voxrelay.db")]
    db_address: String,

    /// Transcription endpoint URL
    #[arg(long, default_value = "https://api.openai.com/v1/audio/transcriptions")]
    api_url: String,

    /// Transcription API key
    #[arg(long, env = "API_KEY", default_value = "")]
    api_key: String,

    /// Request a full history sync when logging in
    #[arg(long)]
    request_full_sync: bool,

    /// Text prepended to every transcript reply
    #[arg(long, default_value = "Transcript: ")]
    reply_prefix: String,
}

/// Operator decision state for an in-flight pairing handshake.
enum PairingGate {
    Idle,
    Awaiting(oneshot::Sender<PairingDecision>),
}

impl PairingGate {
    /// Divert `line` into a pending decision. Returns false when idle, in
    /// which case the line belongs to the command parser.
    fn consume_line(&mut self, line: &str) -> bool {
        match self {
            PairingGate::Idle => return false,
            // The transport stops listening once its decision window elapses
            // and the default policy applies; release the gate so the line
            // reaches the command parser.
            PairingGate::Awaiting(tx) if tx.is_closed() => {
                *self = PairingGate::Idle;
                return false;
            }
            PairingGate::Awaiting(_) => {}
        }
        match line.trim() {
            "r" => {
                if let PairingGate::Awaiting(tx) = std::mem::replace(self, PairingGate::Idle) {
                    let _ = tx.send(PairingDecision::Reject);
                }
            }
            "a" => {
                if let PairingGate::Awaiting(tx) = std::mem::replace(self, PairingGate::Idle) {
                    let _ = tx.send(PairingDecision::Accept);
                }
            }
            other => {
                info!(input = %other, "waiting for pairing decision, type r or a");
            }
        }
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "voxrelay=debug"
    } else {
        "voxrelay=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let store = DeviceStore::open(&args.db_dialect, &args.db_address)
        .context("failed to open device store")?;
    let device = store
        .get_or_create_first_device()
        .context("failed to load device")?;

    let paired = device.jid.is_some();
    let device_id = device.id.clone();
    let transport = Arc::new(StubTransport::new(device, args.request_full_sync));

    let mut events = transport.subscribe_events();
    let mut pairing_rx = transport
        .pairing_requests()
        .ok_or_else(|| anyhow::anyhow!("pairing channel already taken"))?;

    if !paired {
        match transport.qr_updates() {
            Ok(rx) => spawn_qr_logger(rx),
            Err(e) => debug!(error = %e, "no QR channel"),
        }
    }

    transport.connect().await.context("failed to connect")?;

    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&transport) as Arc<dyn ChatTransport>,
        Transcriber::new(args.api_url, args.api_key),
        args.reply_prefix,
    ));

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut gate = PairingGate::Idle;
    let command_transport: Arc<dyn ChatTransport> = transport.clone();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, exiting");
                break;
            }
            _ = shutdown_rx.recv() => {
                break;
            }
            request = pairing_rx.recv() => {
                let Some(request) = request else { continue };
                on_pairing_request(request, &mut gate);
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if dispatcher.handle(event).await == Flow::Shutdown {
                                let _ = shutdown_tx.send(()).await;
                            }
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event subscriber lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else {
                    info!("stdin closed, exiting");
                    break;
                };
                if gate.consume_line(&line) {
                    continue;
                }
                if let Some(cmd) = commands::parse(&line) {
                    commands::handle(&command_transport, &store, &device_id, cmd).await?;
                }
            }
        }
    }

    transport.disconnect().await;
    Ok(())
}

fn on_pairing_request(request: PairingRequest, gate: &mut PairingGate) {
    info!(
        jid = %request.jid,
        platform = %request.platform,
        business_name = %request.business_name,
        "pairing requested, type r within 3 seconds to reject or a to accept"
    );
    *gate = PairingGate::Awaiting(request.decision);
}

fn spawn_qr_logger(mut rx: mpsc::Receiver<QrUpdate>) {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                QrUpdate::Code(code) => info!(%code, "QR code, scan to link"),
                QrUpdate::Outcome(outcome) => {
                    info!(%outcome, "login event");
                    break;
                }
            }
        }
    });
}
