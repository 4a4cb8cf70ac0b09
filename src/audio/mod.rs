pub mod backend;
pub mod buffer;
pub mod file;
pub mod header;
pub mod simulated;

pub use backend::{
    CaptureBlock, ChannelId, DeviceInfo, DeviceRecordingStatus, DeviceRef, InfoSelector,
    PlaybackCompletion, RecordQuality, ServiceError, SoundCommand, SoundService,
    COMPLETION_SIGNATURE, UNITY_RATE,
};
pub use buffer::{BufferState, SoundBuffer, WeakSoundBuffer};
pub use file::{SoundFile, SoundLibrary};
pub use header::{CompressionType, HeaderError, SoundFormat, SoundHeader};
pub use simulated::{SimulatedSoundService, SimulatorConfig};
