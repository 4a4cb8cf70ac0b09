//! HTTP API for driving the sound helper
//!
//! Playback:
//! - POST /play - Play a library sound (or open a bare channel)
//! - POST /play/stop-all - Stop every playback
//! - POST /play/:ref/{stop,pause,resume} - Control one playback
//! - GET /play/:ref/status - Playback status
//!
//! Recording:
//! - POST /record/{start,stop,pause,continue} - Control the recording
//! - GET /record/status - Recording progress
//! - GET /record/sound - Take the finished recording
//! - DELETE /record/sound - Discard it
//!
//! - GET /status - Pool usage and uptime
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
