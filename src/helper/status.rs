use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a playback session, issued in increasing order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RefNum(pub u32);

impl fmt::Display for RefNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State of a playback session as seen through its reference number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    /// The reference number was never issued
    Error,
    /// Issued, but the session has ended
    Finished,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Recording,
    Paused,
    Finished,
}

/// Progress of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub state: RecordState,

    /// Input level, 0-255 (0 once finished)
    pub meter_level: u16,

    /// Length of the recording buffer in milliseconds
    pub total_record_ms: u64,

    /// Milliseconds recorded so far
    pub current_record_ms: u64,
}

/// What one `idle()` pass reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IdleReport {
    pub slots_released: usize,
    pub recording_finished: bool,
}

/// Outcome of `shutdown()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Every session drained before the timeout
    pub drained: bool,
    /// Slots still in use when the wait ended
    pub outstanding_slots: usize,
    /// The recording session was still active when the wait ended
    pub recording_outstanding: bool,
    /// Reap passes run while waiting
    pub idle_passes: usize,
}
