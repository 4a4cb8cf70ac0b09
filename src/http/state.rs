use crate::audio::SoundLibrary;
use crate::helper::NotifyFlag;
use crate::host::SharedHelper;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The helper context every request shares
    pub helper: SharedHelper,

    /// Sounds addressable by id
    pub library: Arc<SoundLibrary>,

    /// Raised when the current recording has been finalized
    pub record_done: NotifyFlag,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(helper: SharedHelper, library: SoundLibrary) -> Self {
        Self {
            helper,
            library: Arc::new(library),
            record_done: NotifyFlag::new(),
            started_at: Utc::now(),
        }
    }
}
