// Integration tests for the session event stream
//
// An in-process websocket server stands in for the remote stream endpoint.

mod common;

use common::{event_json, eventually, test_config, FakeService, ScriptedFactory, StreamServer};
use notelink::{App, Intent, SessionRequest, StreamStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn app_for(server: &StreamServer, heartbeat_ms: u64) -> App {
    let mut config = test_config(&server.base_url());
    config.stream.heartbeat_interval_ms = heartbeat_ms;
    App::with_parts(config, FakeService::new(), Arc::new(ScriptedFactory::new(0, false))).unwrap()
}

fn request() -> SessionRequest {
    SessionRequest::new("artist-7", Intent::CreativeSession)
}

#[tokio::test]
async fn test_stream_opens_for_new_session() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    let session = app.controller().ensure_session(request()).await.unwrap();

    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);
    assert_eq!(server.sessions.lock().unwrap().as_slice(), [session.session_id().to_string()]);
    assert!(eventually(WAIT, || async { app.controller().stream_status() == StreamStatus::Connected }).await);
}

#[tokio::test]
async fn test_reconnects_while_session_active() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    app.controller().ensure_session(request()).await.unwrap();
    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);

    server.close_all();

    assert!(
        eventually(WAIT, || async { server.connections() >= 2 }).await,
        "stream should reconnect after the server drops it"
    );
    assert!(eventually(WAIT, || async { app.controller().stream_status().is_connected() }).await);
}

#[tokio::test]
async fn test_no_reconnect_after_session_closed() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    app.controller().ensure_session(request()).await.unwrap();
    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);

    app.controller().close_session().await.unwrap();
    server.close_all();

    // Several reconnect delays
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(server.connections(), 1);
    assert_eq!(app.controller().stream_status(), StreamStatus::Closed);
}

#[tokio::test]
async fn test_heartbeat_sent_on_interval() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 100);

    app.controller().ensure_session(request()).await.unwrap();

    assert!(
        eventually(WAIT, || async { server.pings() >= 3 }).await,
        "expected at least 3 pings, got {}",
        server.pings()
    );

    // Replies to pings never land in the feed
    assert!(app.controller().events().await.is_empty());
    assert_eq!(app.controller().stats().await.messages_rejected, 0);
}

#[tokio::test]
async fn test_malformed_message_skipped() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    let session = app.controller().ensure_session(request()).await.unwrap();
    let session_id = session.session_id().to_string();
    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);

    // Missing session_id
    server.send(
        json!({
            "source": "audio_analysis",
            "target": "broadcast",
            "payload": {},
            "created_at": "2025-03-01T10:15:30"
        })
        .to_string(),
    );
    server.send("not json at all");
    server.send(event_json("sess_other", "audio_analysis", json!({ "tempo": 90 })));
    server.send(event_json(&session_id, "audio_analysis", json!({ "tempo": 124 })));

    assert!(eventually(WAIT, || async { app.controller().events().await.len() == 1 }).await);

    let events = app.controller().events().await;
    assert_eq!(events[0].session_id, session_id);
    assert_eq!(events[0].payload["tempo"], 124);
    assert_eq!(app.controller().stats().await.messages_rejected, 3);
    assert!(app.controller().stream_status().is_connected());
}

#[tokio::test]
async fn test_feed_keeps_newest_hundred() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    let session = app.controller().ensure_session(request()).await.unwrap();
    let session_id = session.session_id().to_string();
    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);

    for n in 0..150 {
        server.send(event_json(&session_id, "feedback", json!({ "n": n })));
        // Keep the broadcast channel from lagging
        if n % 20 == 19 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    assert!(eventually(WAIT, || async { app.controller().stream().events_received().await == 150 }).await);

    let events = app.controller().events().await;
    assert_eq!(events.len(), 100);
    assert_eq!(events[0].payload["n"], 149);
    assert_eq!(events[99].payload["n"], 50);
}

#[tokio::test]
async fn test_close_clears_feed() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 30_000);

    let session = app.controller().ensure_session(request()).await.unwrap();
    let session_id = session.session_id().to_string();
    assert!(eventually(WAIT, || async { server.connections() == 1 }).await);

    server.send(event_json(&session_id, "feedback", json!({ "note": "nice groove" })));
    assert!(eventually(WAIT, || async { !app.controller().events().await.is_empty() }).await);

    app.controller().close_session().await.unwrap();

    assert!(app.controller().events().await.is_empty());
}

#[tokio::test]
async fn test_zero_heartbeat_keeps_stream_alive() {
    let server = StreamServer::start().await;
    let app = app_for(&server, 0);

    let session = app.controller().ensure_session(request()).await.unwrap();
    let session_id = session.session_id().to_string();

    assert!(eventually(WAIT, || async { server.pings() >= 3 }).await);

    // Stream task is still alive and delivering
    assert!(app.controller().stream().is_running(&session_id).await);
    server.send(event_json(&session_id, "feedback", json!({ "n": 1 })));
    assert!(eventually(WAIT, || async { app.controller().events().await.len() == 1 }).await);

    // Close must not wait behind an in-progress heartbeat
    tokio::time::timeout(Duration::from_secs(2), app.controller().close_session())
        .await
        .expect("close finished while heartbeats were in flight")
        .unwrap();
    assert_eq!(app.controller().stream_status(), StreamStatus::Closed);
}
