use super::state::AppState;
use crate::audio::RecordQuality;
use crate::error::HelperError;
use crate::helper::{PlayStatus, RecordStatus, RefNum};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    /// Library sound to play; omit to open a bare channel
    pub sound_id: Option<i16>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub ref_num: RefNum,
    pub status: PlayStatus,
}

#[derive(Debug, Deserialize)]
pub struct RecordStartRequest {
    /// Buffer size in kilobytes
    pub max_kilobytes: u16,

    /// Recording quality (default: better)
    #[serde(default)]
    pub quality: RecordQuality,
}

#[derive(Debug, Serialize)]
pub struct RecordStatusResponse {
    #[serde(flatten)]
    pub status: RecordStatus,

    /// The finalized recording is ready to be taken
    pub done: bool,
}

#[derive(Debug, Serialize)]
pub struct HelperStatusResponse {
    pub capacity: usize,
    pub in_use: usize,
    pub recording: bool,
    pub sounds: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: HelperError) -> Response {
    let status = match &err {
        HelperError::BadReference(_)
        | HelperError::SoundNotFound(_)
        | HelperError::NoRecordingAvailable => StatusCode::NOT_FOUND,
        HelperError::OutaChannels => StatusCode::SERVICE_UNAVAILABLE,
        HelperError::AlreadyPaused
        | HelperError::AlreadyContinued
        | HelperError::NotRecording
        | HelperError::AlreadyRecording => StatusCode::CONFLICT,
        HelperError::NonAsyncDevice
        | HelperError::OutOfMemory { .. }
        | HelperError::InvalidHeader(_)
        | HelperError::Service(_) => {
            error!("Sound helper failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn message(status: &str, message: String) -> Response {
    (
        StatusCode::OK,
        Json(MessageResponse {
            status: status.to_string(),
            message,
        }),
    )
        .into_response()
}

// ============================================================================
// Playback Handlers
// ============================================================================

/// POST /play
/// Play a library sound, or open a bare channel when no id is given
pub async fn play(State(state): State<AppState>, Json(req): Json<PlayRequest>) -> Response {
    let mut helper = state.helper.lock().await;

    let result = match req.sound_id {
        Some(id) => helper.play_by_id(&state.library, id),
        None => helper.play(None),
    };

    match result {
        Ok(ref_num) => {
            info!("Playback {} started (sound {:?})", ref_num, req.sound_id);
            (
                StatusCode::OK,
                Json(PlayResponse {
                    ref_num,
                    status: helper.status(ref_num),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /play/stop-all
pub async fn stop_all(State(state): State<AppState>) -> Response {
    state.helper.lock().await.stop_all();
    message("stopped", "All playback stopped".to_string())
}

/// POST /play/:ref_num/stop
pub async fn stop(State(state): State<AppState>, Path(ref_num): Path<u32>) -> Response {
    match state.helper.lock().await.stop(RefNum(ref_num)) {
        Ok(()) => message("stopped", format!("Playback {} stopped", ref_num)),
        Err(e) => error_response(e),
    }
}

/// POST /play/:ref_num/pause
pub async fn pause(State(state): State<AppState>, Path(ref_num): Path<u32>) -> Response {
    match state.helper.lock().await.pause(RefNum(ref_num)) {
        Ok(()) => message("paused", format!("Playback {} paused", ref_num)),
        Err(e) => error_response(e),
    }
}

/// POST /play/:ref_num/resume
pub async fn resume(State(state): State<AppState>, Path(ref_num): Path<u32>) -> Response {
    match state.helper.lock().await.resume(RefNum(ref_num)) {
        Ok(()) => message("playing", format!("Playback {} resumed", ref_num)),
        Err(e) => error_response(e),
    }
}

/// GET /play/:ref_num/status
pub async fn play_status(State(state): State<AppState>, Path(ref_num): Path<u32>) -> Response {
    let ref_num = RefNum(ref_num);
    let status = state.helper.lock().await.status(ref_num);
    (StatusCode::OK, Json(PlayResponse { ref_num, status })).into_response()
}

// ============================================================================
// Recording Handlers
// ============================================================================

/// POST /record/start
pub async fn record_start(
    State(state): State<AppState>,
    Json(req): Json<RecordStartRequest>,
) -> Response {
    let result = state.helper.lock().await.record_start(
        req.max_kilobytes,
        req.quality,
        Some(state.record_done.clone()),
    );

    match result {
        Ok(()) => message(
            "recording",
            format!("Recording started ({} KB)", req.max_kilobytes),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /record/stop
pub async fn record_stop(State(state): State<AppState>) -> Response {
    match state.helper.lock().await.record_stop() {
        Ok(()) => message("stopping", "Recording stop requested".to_string()),
        Err(e) => error_response(e),
    }
}

/// POST /record/pause
pub async fn record_pause(State(state): State<AppState>) -> Response {
    match state.helper.lock().await.record_pause() {
        Ok(()) => message("paused", "Recording paused".to_string()),
        Err(e) => error_response(e),
    }
}

/// POST /record/continue
pub async fn record_continue(State(state): State<AppState>) -> Response {
    match state.helper.lock().await.record_continue() {
        Ok(()) => message("recording", "Recording continued".to_string()),
        Err(e) => error_response(e),
    }
}

/// GET /record/status
pub async fn record_status(State(state): State<AppState>) -> Response {
    match state.helper.lock().await.record_status() {
        Ok(status) => (
            StatusCode::OK,
            Json(RecordStatusResponse {
                status,
                done: state.record_done.is_raised(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /record/sound
/// Take the finished recording (header plus samples). Only succeeds once.
pub async fn take_recorded_sound(State(state): State<AppState>) -> Response {
    match state.helper.lock().await.get_recorded_sound() {
        Ok(sound) => {
            info!("Recorded sound taken: {} bytes", sound.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                sound.bytes().to_vec(),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Recorded sound unavailable: {}", e);
            error_response(e)
        }
    }
}

/// DELETE /record/sound
pub async fn discard_recorded_sound(State(state): State<AppState>) -> Response {
    if state.helper.lock().await.discard_recorded_sound() {
        message("discarded", "Recorded sound discarded".to_string())
    } else {
        error_response(HelperError::NoRecordingAvailable)
    }
}

// ============================================================================
// Service Handlers
// ============================================================================

/// GET /status
pub async fn helper_status(State(state): State<AppState>) -> impl IntoResponse {
    let helper = state.helper.lock().await;
    Json(HelperStatusResponse {
        capacity: helper.capacity(),
        in_use: helper.in_use_count(),
        recording: helper.is_recording(),
        sounds: state.library.len(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
