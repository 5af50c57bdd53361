// Integration tests for the REST client
//
// A wiremock server plays the remote session service.

use anyhow::Result;
use notelink::{AudioFrame, HttpSessionService, Intent, SessionRequest, SessionService};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_body(session_id: &str, active: bool) -> serde_json::Value {
    json!({
        "metadata": {
            "session_id": session_id,
            "user_id": "artist-7",
            "intent": "creative_session",
            "daw": "Ableton",
            "key": "C#m",
            "tempo": 124.0,
            "references": ["Daft Punk - Digital Love"],
            "created_at": "2025-03-01T10:15:30.123456"
        },
        "active": active,
        "attributes": { "region": "eu" }
    })
}

fn service(server: &MockServer) -> HttpSessionService {
    HttpSessionService::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_session_posts_request() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_partial_json(json!({
            "user_id": "artist-7",
            "intent": "creative_session",
            "references": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("sess_1", true)))
        .expect(1)
        .mount(&server)
        .await;

    let state = service(&server)
        .create_session(&SessionRequest::new("artist-7", Intent::CreativeSession))
        .await?;

    assert_eq!(state.session_id(), "sess_1");
    assert!(state.active);
    assert_eq!(state.metadata.key.as_deref(), Some("C#m"));
    assert_eq!(state.metadata.created_at.timestamp(), 1740824130);
    assert_eq!(state.attributes["region"], "eu");

    Ok(())
}

#[tokio::test]
async fn test_close_session_path() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions/sess_1/close"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("sess_1", false)))
        .expect(1)
        .mount(&server)
        .await;

    let state = service(&server).close_session("sess_1").await?;
    assert!(!state.active);

    Ok(())
}

#[tokio::test]
async fn test_submit_frame_returns_ack() -> Result<()> {
    let server = MockServer::start().await;

    let frame = AudioFrame::from_samples("sess_1", &[0.25; 4096], 22050, 1_700_000_000_000.0)?;

    let mut ack = serde_json::to_value(&frame)?;
    ack["rms"] = json!(0.25);
    ack["peak"] = json!(0.25);

    Mock::given(method("POST"))
        .and(path("/sessions/sess_1/audio"))
        .and(body_partial_json(json!({
            "session_id": "sess_1",
            "frame_id": frame.frame_id,
            "sample_rate": 22050,
            "channels": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(ack))
        .expect(1)
        .mount(&server)
        .await;

    let acked = service(&server).submit_frame(&frame).await?;

    assert_eq!(acked.frame_id, frame.frame_id);
    assert_eq!(acked.rms, Some(0.25));
    assert!((acked.duration_ms - 185.76).abs() < 0.01);

    Ok(())
}

#[tokio::test]
async fn test_telemetry_snapshot() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "counter.sessions.created": 4.0,
            "timer.audio.ingest.avg_ms": 2.5
        })))
        .mount(&server)
        .await;

    let snapshot = service(&server).telemetry().await?;

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("counter.sessions.created"), Some(4.0));

    Ok(())
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("tempo out of range"))
        .mount(&server)
        .await;

    let err = service(&server)
        .create_session(&SessionRequest::new("artist-7", Intent::MixFeedback))
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("422"), "got: {}", message);
    assert!(message.contains("tempo out of range"), "got: {}", message);
}

#[tokio::test]
async fn test_base_url_path_prefix() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/telemetry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpSessionService::new(&format!("{}/api", server.uri()), Duration::from_secs(5))?;
    let snapshot = service.telemetry().await?;
    assert!(snapshot.is_empty());

    Ok(())
}
