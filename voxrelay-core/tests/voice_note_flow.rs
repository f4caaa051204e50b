//! End-to-end flow over the broadcast subscription: transport event →
//! dispatcher → transcription endpoint → quoted reply, the way the binary
//! wires it (one spawned task per event, shutdown over a channel).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxrelay_core::{
    AudioAttachment, ChatTransport, DeviceRecord, EventDispatcher, Flow, Jid, MessageEvent,
    SessionEvent, StubTransport, Transcriber,
};

fn message(id: &str, audio: Option<AudioAttachment>) -> MessageEvent {
    MessageEvent {
        id: id.into(),
        sender: Jid::on_default_server("491701234567"),
        chat: Jid::on_default_server("4915512345678"),
        push_name: "Alice".into(),
        timestamp: Utc::now(),
        message_type: "media".into(),
        category: String::new(),
        view_once: false,
        ephemeral: false,
        edit: false,
        text: None,
        audio,
    }
}

fn voice_attachment(media_id: &str) -> AudioAttachment {
    AudioAttachment {
        media_id: media_id.into(),
        mime_type: "audio/ogg; codecs=opus".into(),
        duration_secs: Some(2),
        push_to_talk: true,
    }
}

#[tokio::test]
async fn voice_notes_are_replied_to_and_terminal_events_stop_the_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;

    let stub = Arc::new(StubTransport::new(DeviceRecord::generate(), false));
    let mut events = stub.subscribe_events();
    stub.connect().await.expect("connect");
    stub.insert_media("media-1", b"opus-bytes".to_vec());

    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&stub) as Arc<dyn ChatTransport>,
        Transcriber::new(
            format!("{}/v1/audio/transcriptions", server.uri()),
            "test-key",
        ),
        "\u{1f5e3} ",
    ));

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    // Event loop shaped like the binary's: every event on its own task.
    let loop_dispatcher = Arc::clone(&dispatcher);
    let event_loop = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let dispatcher = Arc::clone(&loop_dispatcher);
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if dispatcher.handle(event).await == Flow::Shutdown {
                    let _ = shutdown_tx.send(()).await;
                }
            });
        }
    });

    stub.emit(SessionEvent::Message(message(
        "3EB0AABBCC01",
        Some(voice_attachment("media-1")),
    )));
    // A plain text message flows through without producing a reply.
    stub.emit(SessionEvent::Message(message("3EB0AABBCC02", None)));
    stub.emit(SessionEvent::StreamReplaced);

    tokio::time::timeout(Duration::from_secs(5), shutdown_rx.recv())
        .await
        .expect("terminal event unblocks the shutdown channel")
        .expect("shutdown sender alive");
    assert!(dispatcher.is_terminated());

    // Give the in-flight message task a moment to finish its reply.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !stub.sent_messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reply recorded");

    let sent = stub.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "\u{1f5e3} hello world");
    assert_eq!(sent[0].to, Jid::on_default_server("4915512345678"));
    let quote = sent[0].quote.as_ref().expect("quoted reply");
    assert_eq!(quote.message_id, "3EB0AABBCC01");

    event_loop.abort();
}

#[tokio::test]
async fn transcript_reply_uses_the_origin_chat_not_the_sender() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("group reply"))
        .mount(&server)
        .await;

    let stub = Arc::new(StubTransport::new(DeviceRecord::generate(), false));
    stub.connect().await.expect("connect");
    stub.insert_media("media-9", b"opus-bytes".to_vec());

    let dispatcher = EventDispatcher::new(
        Arc::clone(&stub) as Arc<dyn ChatTransport>,
        Transcriber::new(
            format!("{}/v1/audio/transcriptions", server.uri()),
            "test-key",
        ),
        "",
    );

    let mut msg = message("3EB0AABBCC03", Some(voice_attachment("media-9")));
    msg.chat = Jid::new("12036304", "g.us");

    dispatcher.handle(SessionEvent::Message(msg)).await;

    let sent = stub.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, Jid::new("12036304", "g.us"));
    assert_eq!(sent[0].body, "group reply");
    assert_eq!(
        sent[0].quote.as_ref().expect("quote").sender,
        Jid::on_default_server("491701234567")
    );
}
