pub mod audio;
pub mod config;
pub mod error;
pub mod helper;
pub mod host;
pub mod http;

pub use audio::{
    BufferState, CompressionType, RecordQuality, ServiceError, SimulatedSoundService,
    SimulatorConfig, SoundBuffer, SoundFile, SoundFormat, SoundHeader, SoundLibrary,
    SoundService,
};
pub use config::Config;
pub use error::{HelperError, Result};
pub use helper::{
    HelperConfig, IdleReport, NotifyFlag, PlayStatus, RecordState, RecordStatus, RefNum,
    ShutdownReport, SoundHelper,
};
pub use host::{run_host_loop, SharedHelper};
pub use http::{create_router, AppState};
