use crate::audio::{HeaderError, ServiceError};
use crate::helper::RefNum;

/// Errors reported by the sound helper.
///
/// `BadReference` is frequently benign: the session may simply have finished
/// on its own before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HelperError {
    /// Every output slot is in use
    #[error("no free output channels")]
    OutaChannels,

    #[error("no playing sound has reference number {0}")]
    BadReference(RefNum),

    #[error("already paused")]
    AlreadyPaused,

    #[error("already playing")]
    AlreadyContinued,

    #[error("not recording")]
    NotRecording,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("sound input device cannot record asynchronously")]
    NonAsyncDevice,

    #[error("no recorded sound available")]
    NoRecordingAvailable,

    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("sound {0} not found")]
    SoundNotFound(i16),

    #[error("invalid sound header: {0}")]
    InvalidHeader(#[from] HeaderError),

    /// Failure reported by the sound service, passed through unchanged
    #[error("sound service: {0}")]
    Service(#[from] ServiceError),
}

pub type Result<T, E = HelperError> = std::result::Result<T, E>;
