//! Session event dispatcher.
//!
//! Two states: running and terminated. Terminal events (`StreamReplaced`,
//! `Disconnected`) latch the terminated flag exactly once; message events
//! drive the voice-note → transcript → quoted-reply path. The dispatcher adds
//! no locking of its own; concurrent message handling relies on the
//! transport's and HTTP client's internal synchronization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::client::ChatTransport;
use crate::event::{MessageEvent, QuoteRef, SessionEvent};
use crate::transcribe::Transcriber;

/// What the caller should do after an event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct EventDispatcher {
    transport: Arc<dyn ChatTransport>,
    transcriber: Transcriber,
    reply_prefix: String,
    terminated: AtomicBool,
}

impl EventDispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        transcriber: Transcriber,
        reply_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            transcriber,
            reply_prefix: reply_prefix.into(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Handle one session event.
    ///
    /// Returns [`Flow::Shutdown`] for terminal events and for anything that
    /// arrives after termination; the transition itself is logged only once.
    pub async fn handle(&self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::StreamReplaced | SessionEvent::Disconnected => {
                if !self.terminated.swap(true, Ordering::SeqCst) {
                    info!("terminal session event received, shutting down");
                }
                Flow::Shutdown
            }
            SessionEvent::Message(msg) => {
                if self.is_terminated() {
                    debug!(message_id = %msg.id, "ignoring message after termination");
                    return Flow::Shutdown;
                }
                self.handle_message(msg).await;
                Flow::Continue
            }
            other => {
                debug!(event = ?other, "ignoring session event");
                Flow::Continue
            }
        }
    }

    async fn handle_message(&self, msg: MessageEvent) {
        info!(
            message_id = %msg.id,
            sender = %msg.sender,
            chat = %msg.chat,
            meta = %message_meta(&msg),
            "received message"
        );

        let Some(audio) = msg.audio.as_ref() else {
            return;
        };

        let audio_data = match self.transport.download_media(audio).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, message_id = %msg.id, "failed to download audio");
                return;
            }
        };

        // Uploaded audio files are downloaded but not transcribed; only
        // recorded voice messages are.
        if !audio.push_to_talk {
            return;
        }

        let Some(text) = self.transcriber.transcribe(&audio_data).await else {
            return;
        };

        let body = format!("{}{}", self.reply_prefix, text);
        let quote = QuoteRef {
            message_id: msg.id.clone(),
            sender: msg.sender.clone(),
        };
        if let Err(e) = self.transport.send_quoted_text(&msg.chat, &body, &quote).await {
            error!(error = %e, chat = %msg.chat, "failed to send transcript reply");
        }
    }
}

/// Human-readable metadata line, mirrored into the receive log only.
fn message_meta(msg: &MessageEvent) -> String {
    let mut parts = vec![
        format!("pushname: {}", msg.push_name),
        format!("timestamp: {}", msg.timestamp),
    ];
    if !msg.message_type.is_empty() {
        parts.push(format!("type: {}", msg.message_type));
    }
    if !msg.category.is_empty() {
        parts.push(format!("category: {}", msg.category));
    }
    if msg.view_once {
        parts.push("view once".into());
    }
    if msg.ephemeral {
        parts.push("ephemeral".into());
    }
    if msg.edit {
        parts.push("edit".into());
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::stub::StubTransport;
    use crate::event::AudioAttachment;
    use crate::jid::Jid;
    use crate::store::DeviceRecord;

    fn voice_note(media_id: &str, push_to_talk: bool) -> MessageEvent {
        MessageEvent {
            id: "3EB0AABBCCDD".into(),
            sender: Jid::on_default_server("491701234567"),
            chat: Jid::on_default_server("491701234567"),
            push_name: "Alice".into(),
            timestamp: Utc::now(),
            message_type: "media".into(),
            category: String::new(),
            view_once: false,
            ephemeral: false,
            edit: false,
            text: None,
            audio: Some(AudioAttachment {
                media_id: media_id.into(),
                mime_type: "audio/ogg; codecs=opus".into(),
                duration_secs: Some(3),
                push_to_talk,
            }),
        }
    }

    async fn connected_stub() -> Arc<StubTransport> {
        let stub = Arc::new(StubTransport::new(DeviceRecord::generate(), false));
        stub.connect().await.expect("connect stub");
        stub
    }

    fn dispatcher(stub: &Arc<StubTransport>, api_url: String) -> EventDispatcher {
        EventDispatcher::new(
            Arc::clone(stub) as Arc<dyn ChatTransport>,
            Transcriber::new(api_url, "test-key"),
            "Transcript: ",
        )
    }

    #[tokio::test]
    async fn voice_note_produces_quoted_reply_with_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let stub = connected_stub().await;
        stub.insert_media("media-1", b"opus-bytes".to_vec());
        let dispatcher = dispatcher(
            &stub,
            format!("{}/v1/audio/transcriptions", server.uri()),
        );

        let flow = dispatcher
            .handle(SessionEvent::Message(voice_note("media-1", true)))
            .await;
        assert_eq!(flow, Flow::Continue);

        let sent = stub.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Transcript: hello world");
        assert_eq!(sent[0].to, Jid::on_default_server("491701234567"));
        let quote = sent[0].quote.as_ref().expect("reply quotes the original");
        assert_eq!(quote.message_id, "3EB0AABBCCDD");
        assert_eq!(quote.sender, Jid::on_default_server("491701234567"));
    }

    #[tokio::test]
    async fn plain_audio_is_never_transcribed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("should not happen"))
            .expect(0)
            .mount(&server)
            .await;

        let stub = connected_stub().await;
        stub.insert_media("media-2", b"mp3-bytes".to_vec());
        let dispatcher = dispatcher(
            &stub,
            format!("{}/v1/audio/transcriptions", server.uri()),
        );

        dispatcher
            .handle(SessionEvent::Message(voice_note("media-2", false)))
            .await;
        assert!(stub.sent_messages().is_empty());
        // MockServer verifies the zero-request expectation on drop.
    }

    #[tokio::test]
    async fn unreachable_endpoint_sends_no_reply() {
        let stub = connected_stub().await;
        stub.insert_media("media-3", b"opus-bytes".to_vec());
        let dispatcher = dispatcher(&stub, "http://127.0.0.1:9/v1/audio/transcriptions".into());

        dispatcher
            .handle(SessionEvent::Message(voice_note("media-3", true)))
            .await;
        assert!(stub.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn download_failure_drops_the_event() {
        let stub = connected_stub().await;
        let dispatcher = dispatcher(&stub, "http://127.0.0.1:9/".into());

        // No media registered under this id.
        let flow = dispatcher
            .handle(SessionEvent::Message(voice_note("missing", true)))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert!(stub.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn stream_replaced_terminates_exactly_once() {
        let stub = connected_stub().await;
        let dispatcher = dispatcher(&stub, "http://127.0.0.1:9/".into());

        assert!(!dispatcher.is_terminated());
        assert_eq!(dispatcher.handle(SessionEvent::StreamReplaced).await, Flow::Shutdown);
        assert!(dispatcher.is_terminated());

        // Further terminal events and messages keep reporting shutdown
        // without reopening the running state.
        assert_eq!(dispatcher.handle(SessionEvent::Disconnected).await, Flow::Shutdown);
        assert_eq!(
            dispatcher
                .handle(SessionEvent::Message(voice_note("media-4", true)))
                .await,
            Flow::Shutdown
        );
        assert!(stub.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn non_terminal_events_are_ignored() {
        let stub = connected_stub().await;
        let dispatcher = dispatcher(&stub, "http://127.0.0.1:9/".into());

        assert_eq!(dispatcher.handle(SessionEvent::Connected).await, Flow::Continue);
        assert_eq!(dispatcher.handle(SessionEvent::LoggedOut).await, Flow::Continue);
        assert!(!dispatcher.is_terminated());
    }
}
