// Integration tests for the HTTP control API
//
// These tests send requests straight to the router and drive the simulated
// sound service by hand in place of the host loop.

use anyhow::Result;
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sound_helper::{
    create_router, AppState, CompressionType, HelperConfig, NotifyFlag, SharedHelper,
    SimulatedSoundService, SoundBuffer, SoundFormat, SoundHeader, SoundHelper, SoundLibrary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;

fn test_app(channels: usize) -> Result<(Router, SharedHelper)> {
    let config = HelperConfig {
        channels,
        ..Default::default()
    };
    let helper = SoundHelper::new(SimulatedSoundService::default(), NotifyFlag::new(), config)?;
    let helper: SharedHelper = Arc::new(Mutex::new(helper));

    let format = SoundFormat {
        channels: 1,
        sample_rate: 10_000,
        sample_size: 8,
        compression: CompressionType::NONE,
    };
    let mut library = SoundLibrary::new();
    library.insert(1, SoundBuffer::from_samples(format, &[0x80; 1000])?);

    let app = create_router(AppState::new(Arc::clone(&helper), library));
    Ok((app, helper))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Bytes)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, bytes))
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let (status, bytes) = send(app, method, uri, body).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

async fn advance(helper: &SharedHelper, millis: u64) {
    let mut helper = helper.lock().await;
    helper.service_mut().advance(Duration::from_millis(millis));
    if helper.needs_idle() {
        helper.idle();
    }
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (app, _) = test_app(2)?;
    let (status, body) = send(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
    Ok(())
}

#[tokio::test]
async fn test_playback_lifecycle() -> Result<()> {
    let (app, helper) = test_app(2)?;

    let (status, body) = send_json(&app, "POST", "/play", Some(json!({ "sound_id": 1 }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ref_num"], 1);
    assert_eq!(body["status"], "playing");

    let (status, _) = send_json(&app, "POST", "/play/1/pause", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send_json(&app, "POST", "/play/1/pause", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already paused");

    let (_, body) = send_json(&app, "GET", "/play/1/status", None).await?;
    assert_eq!(body["status"], "paused");

    send_json(&app, "POST", "/play/1/resume", None).await?;
    advance(&helper, 150).await;

    let (_, body) = send_json(&app, "GET", "/play/1/status", None).await?;
    assert_eq!(body["status"], "finished");
    let (_, body) = send_json(&app, "GET", "/play/9/status", None).await?;
    assert_eq!(body["status"], "error");

    let (status, _) = send_json(&app, "POST", "/play/1/stop", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "Finished playback has no slot");

    Ok(())
}

#[tokio::test]
async fn test_play_errors() -> Result<()> {
    let (app, _) = test_app(1)?;

    let (status, _) = send_json(&app, "POST", "/play", Some(json!({ "sound_id": 42 }))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, "POST", "/play", Some(json!({ "sound_id": 1 }))).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, "POST", "/play", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send_json(&app, "POST", "/play/stop-all", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send_json(&app, "GET", "/status", None).await?;
    assert_eq!(body["in_use"], 0);
    assert_eq!(body["capacity"], 1);
    assert_eq!(body["sounds"], 1);

    Ok(())
}

#[tokio::test]
async fn test_recording_lifecycle() -> Result<()> {
    let (app, helper) = test_app(2)?;

    let (status, _) = send_json(&app, "GET", "/record/status", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let start = json!({ "max_kilobytes": 1, "quality": "good" });
    let (status, _) = send_json(&app, "POST", "/record/start", Some(start.clone())).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, "POST", "/record/start", Some(start)).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(&app, "GET", "/record/sound", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "Nothing to take yet");

    advance(&helper, 100).await;

    let (_, body) = send_json(&app, "GET", "/record/status", None).await?;
    assert_eq!(body["state"], "finished");
    assert_eq!(body["done"], true);

    let (status, bytes) = send(&app, "GET", "/record/sound", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (header, offset) = SoundHeader::parse(&bytes)?;
    assert_eq!(offset, SoundHeader::LEN);
    assert_eq!(bytes.len(), offset + header.data_len as usize);

    let (status, _) = send_json(&app, "DELETE", "/record/sound", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "Sound was already taken");

    Ok(())
}

#[tokio::test]
async fn test_recording_stop_and_discard() -> Result<()> {
    let (app, helper) = test_app(2)?;

    send_json(&app, "POST", "/record/start", Some(json!({ "max_kilobytes": 16 }))).await?;
    advance(&helper, 20).await;

    let (status, _) = send_json(&app, "POST", "/record/pause", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, "POST", "/record/continue", None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(&app, "POST", "/record/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    advance(&helper, 10).await;

    let (status, _) = send_json(&app, "DELETE", "/record/sound", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, "GET", "/record/sound", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
