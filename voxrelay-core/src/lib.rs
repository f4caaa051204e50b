//! # voxrelay-core
//!
//! Reusable voice-note transcription relay SDK.
//!
//! ## Architecture
//!
//! ```text
//! ChatTransport → broadcast::Sender<SessionEvent> → EventDispatcher
//!                                                        │
//!                                             download_media (voice note)
//!                                                        │
//!                                            Transcriber::transcribe (HTTP)
//!                                                        │
//!                                        send_quoted_text → origin chat
//! ```
//!
//! The transport is a trait seam: the wire protocol (pairing crypto,
//! encryption, multi-device sync) lives behind `ChatTransport`. The in-process
//! `StubTransport` exercises the full event/reply path end-to-end.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod jid;
pub mod store;
pub mod transcribe;

// Convenience re-exports for downstream crates
pub use client::{stub::StubTransport, ChatTransport};
pub use dispatch::{EventDispatcher, Flow};
pub use error::VoxrelayError;
pub use event::{
    AudioAttachment, MessageEvent, PairingDecision, PairingRequest, QrUpdate, QuoteRef,
    SendReceipt, SessionEvent,
};
pub use jid::{Jid, DEFAULT_USER_SERVER};
pub use store::{DeviceRecord, DeviceStore};
pub use transcribe::Transcriber;
