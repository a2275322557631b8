//! Round trips against real localhost websocket servers.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use voxrelay::error::VoxrelayError;
use voxrelay::recognition::backend::{SpeechBackend, StreamParams};
use voxrelay::recognition::ws::WsSpeechBackend;
use voxrelay::relay::link::LinkConnector;
use voxrelay::relay::ws::WsLinkConnector;

/// Bind a localhost listener and return it with its ws:// URL.
async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}"))
}

#[tokio::test]
async fn command_link_sends_and_receives_acks_in_lockstep() {
    let (listener, url) = local_server().await;

    // Actuator stand-in: one ack text frame per command text frame.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut received = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    received.push(text.to_string());
                    ws.send(Message::Text(format!("ok:{text}").into()))
                        .await
                        .unwrap();
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    let connector = WsLinkConnector::new(&url);
    let mut link = connector.connect().await.unwrap();

    link.send("앞으로").await.unwrap();
    assert_eq!(link.recv_ack().await.unwrap(), "ok:앞으로");

    link.send("정지").await.unwrap();
    assert_eq!(link.recv_ack().await.unwrap(), "ok:정지");

    link.close().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received, vec!["앞으로", "정지"]);
}

#[tokio::test]
async fn command_link_reports_lost_connection_on_server_close() {
    let (listener, url) = local_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Read the command, then hang up without answering.
        let _ = ws.next().await;
        ws.close(None).await.unwrap();
    });

    let connector = WsLinkConnector::new(&url);
    let mut link = connector.connect().await.unwrap();

    link.send("앞으로").await.unwrap();
    let result = link.recv_ack().await;
    assert!(matches!(
        result,
        Err(VoxrelayError::DispatchConnectionLost { .. })
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn command_link_connect_failure_is_dispatch_connection_lost() {
    // Bind then drop, so the port is closed.
    let (listener, url) = local_server().await;
    drop(listener);

    let connector = WsLinkConnector::new(&url);
    let result = connector.connect().await;
    assert!(matches!(
        result.err(),
        Some(VoxrelayError::DispatchConnectionLost { .. })
    ));
}

#[tokio::test]
async fn speech_backend_streams_init_frames_and_events() {
    let (listener, url) = local_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // First message is the JSON init describing the audio.
        let init = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            other => panic!("expected init text frame, got {other:?}"),
        };
        assert_eq!(init["config"]["sample_rate"], 16000);
        assert_eq!(init["config"]["language"], "ko-KR");
        assert_eq!(init["config"]["interim_results"], true);

        // Then binary PCM: 3 samples → 6 little-endian bytes.
        let frame = match ws.next().await.unwrap().unwrap() {
            Message::Binary(bytes) => bytes,
            other => panic!("expected binary frame, got {other:?}"),
        };
        assert_eq!(frame.len(), 6);

        // Answer with one result, then close the stream.
        let result =
            r#"{"results": [{"alternatives": [{"transcript": "왼쪽"}], "is_final": false}]}"#;
        ws.send(Message::Text(result.to_string().into()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
    });

    let backend = WsSpeechBackend::new(&url);
    let (mut sink, mut source) = backend.open_stream(&StreamParams::default()).await.unwrap();

    sink.push_frame(&[1i16, 2, 3]).await.unwrap();

    let event = source.next_event().await.unwrap().unwrap();
    assert_eq!(event.transcript, "왼쪽");
    assert!(!event.is_final);

    // Backend closed the stream: the source reports end-of-stream.
    let end = tokio::time::timeout(Duration::from_secs(2), source.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(end, None);

    sink.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn speech_backend_connect_failure_is_transient() {
    let (listener, url) = local_server().await;
    drop(listener);

    let backend = WsSpeechBackend::new(&url);
    let result = backend.open_stream(&StreamParams::default()).await;
    assert!(matches!(
        result.err(),
        Some(VoxrelayError::StreamTransient { .. })
    ));
}
