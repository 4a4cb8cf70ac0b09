use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buffer::SoundBuffer;
use super::header::CompressionType;
use crate::helper::NotifyFlag;

/// Signature carried in `param1` of the callback command the helper queues
/// behind every playback. Notifications without it are ignored.
pub const COMPLETION_SIGNATURE: u32 = u32::from_be_bytes(*b"SHcb");

/// Unity playback rate (16.16 fixed point).
pub const UNITY_RATE: u32 = 0x0001_0000;

/// Handle to a playback channel opened on the sound service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

/// Handle to an open sound input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef(pub u32);

/// Commands understood by a playback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCommand {
    /// Drop every command still waiting in the channel queue
    Flush,
    /// Silence the sound currently playing
    Quiet,
    /// Suspend command queue processing
    Pause,
    /// Resume command queue processing
    Resume,
    /// Set the playback rate of the sampled sound (16.16 fixed point, 0 halts)
    Rate(u32),
    /// Ask the channel to call back once every earlier command has run
    Callback { param1: u32, param2: u32 },
}

/// Recording quality requested from the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordQuality {
    Good,
    #[default]
    Better,
    Best,
}

/// Input device properties that can be queried or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoSelector {
    NumberChannels,
    SampleRate,
    SampleSize,
    CompressionType,
    Async,
    LevelMeter,
    RecordingQuality,
}

/// Value of an input device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInfo {
    NumberChannels(u16),
    SampleRate(u32),
    SampleSize(u16),
    CompressionType(CompressionType),
    Async(bool),
    LevelMeter(bool),
    RecordingQuality(RecordQuality),
}

/// Live progress reported by an input device while it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceRecordingStatus {
    pub recording: bool,
    pub meter_level: u16,
    pub total_samples: u64,
    pub samples_recorded: u64,
    pub total_msecs: u64,
    pub current_msecs: u64,
}

/// Failure reported by the sound service.
///
/// Codes are stable so that a status can be stashed in an atomic word by the
/// completion context and decoded later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("recording aborted")]
    Aborted,

    #[error("sound service is out of memory")]
    MemFull,

    #[error("no such sound channel")]
    BadChannel,

    #[error("sound input device is not available")]
    DeviceNotAvailable,

    #[error("sound input device overrun")]
    Overrun,

    #[error("unexpected device info reply")]
    UnexpectedInfo,

    #[error("sound service error {0}")]
    Other(i32),
}

impl ServiceError {
    pub fn code(self) -> i32 {
        match self {
            Self::Aborted => -27,
            Self::MemFull => -108,
            Self::BadChannel => -205,
            Self::DeviceNotAvailable => -220,
            Self::Overrun => -227,
            Self::UnexpectedInfo => -50,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            -27 => Some(Self::Aborted),
            -108 => Some(Self::MemFull),
            -205 => Some(Self::BadChannel),
            -220 => Some(Self::DeviceNotAvailable),
            -227 => Some(Self::Overrun),
            -50 => Some(Self::UnexpectedInfo),
            other => Some(Self::Other(other)),
        }
    }
}

/// Completion handler attached to a playback channel.
///
/// Runs in the sound service's completion context: it must not allocate,
/// block or tear anything down. All it does is flip two flags.
#[derive(Debug, Clone)]
pub struct PlaybackCompletion {
    pending: Arc<AtomicBool>,
    attention: NotifyFlag,
}

impl PlaybackCompletion {
    pub(crate) fn new(pending: Arc<AtomicBool>, attention: NotifyFlag) -> Self {
        Self { pending, attention }
    }

    /// Called by the service when a `Callback` command reaches the head of the
    /// channel queue. Only commands carrying `COMPLETION_SIGNATURE` count.
    pub fn on_callback(&self, command: &SoundCommand) {
        if let SoundCommand::Callback { param1, .. } = command {
            if *param1 == COMPLETION_SIGNATURE {
                self.pending.store(true, Ordering::Release);
                self.attention.raise();
            }
        }
    }
}

/// Parameter block shared between the recording session and the input device.
///
/// The device writes `count` and the final status; `complete` is the
/// completion-context handler. Nothing here is torn down by the device.
#[derive(Debug)]
pub struct CaptureBlock {
    buffer_length: usize,
    count: AtomicUsize,
    status: AtomicI32,
    complete: AtomicBool,
    attention: NotifyFlag,
}

impl CaptureBlock {
    pub(crate) fn new(buffer_length: usize, attention: NotifyFlag) -> Self {
        Self {
            buffer_length,
            count: AtomicUsize::new(0),
            status: AtomicI32::new(0),
            complete: AtomicBool::new(false),
            attention,
        }
    }

    /// Bytes of sample data the device may capture.
    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    /// Bytes captured so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Device side: record progress, clamped to the buffer length.
    pub fn set_count(&self, count: usize) {
        self.count
            .store(count.min(self.buffer_length), Ordering::Release);
    }

    /// Status the device finished with, if it reported a failure.
    pub fn status(&self) -> Option<ServiceError> {
        ServiceError::from_code(self.status.load(Ordering::Acquire))
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Completion-context handler: stash the device status and ask the host
    /// for a reap pass.
    pub fn complete(&self, status: Result<(), ServiceError>) {
        let code = match status {
            Ok(()) => 0,
            Err(err) => err.code(),
        };
        self.status.store(code, Ordering::Release);
        self.complete.store(true, Ordering::Release);
        self.attention.raise();
    }
}

/// The platform sound service: buffered playback channels plus one
/// asynchronous capture device.
///
/// Completion notifications are delivered through the handles passed in
/// `new_channel` and `record_async`, possibly from another execution context.
pub trait SoundService {
    /// Open a playback channel whose callbacks are routed to `completion`.
    fn new_channel(&mut self, completion: PlaybackCompletion) -> Result<ChannelId, ServiceError>;

    /// Close a channel, optionally silencing it first.
    fn dispose_channel(&mut self, channel: ChannelId, quiet_now: bool) -> Result<(), ServiceError>;

    /// Start asynchronous playback of `sound` on `channel`.
    fn play(&mut self, channel: ChannelId, sound: &SoundBuffer) -> Result<(), ServiceError>;

    /// Append a command to the channel queue.
    fn do_command(&mut self, channel: ChannelId, command: SoundCommand) -> Result<(), ServiceError>;

    /// Execute a command immediately, bypassing the queue.
    fn do_immediate(&mut self, channel: ChannelId, command: SoundCommand)
        -> Result<(), ServiceError>;

    /// Current playback rate, or `None` when the channel's synthesizer does not
    /// understand rate commands.
    fn playback_rate(&mut self, channel: ChannelId) -> Result<Option<u32>, ServiceError>;

    fn open_input(&mut self) -> Result<DeviceRef, ServiceError>;

    fn close_input(&mut self, device: DeviceRef) -> Result<(), ServiceError>;

    fn get_device_info(
        &mut self,
        device: DeviceRef,
        selector: InfoSelector,
    ) -> Result<DeviceInfo, ServiceError>;

    fn set_device_info(&mut self, device: DeviceRef, info: DeviceInfo) -> Result<(), ServiceError>;

    /// Begin asynchronous capture. The device reports progress and completion
    /// through `block`.
    fn record_async(&mut self, device: DeviceRef, block: Arc<CaptureBlock>)
        -> Result<(), ServiceError>;

    /// Stop capture early. The device still completes the request, with
    /// `ServiceError::Aborted`.
    fn stop_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError>;

    fn pause_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError>;

    fn resume_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError>;

    fn recording_status(&mut self, device: DeviceRef) -> Result<DeviceRecordingStatus, ServiceError>;

    /// Copy captured sample bytes into `dest`, returning how many were written.
    fn fetch_captured(&mut self, device: DeviceRef, dest: &mut [u8]) -> Result<usize, ServiceError>;
}
