//! Asynchronous sound helper
//!
//! `SoundHelper` owns a fixed pool of playback slots and a single recording
//! session on top of a [`SoundService`]. The service reports completions from
//! its own execution context; those handlers only raise flags. All teardown
//! happens later, in [`SoundHelper::idle`], which the host calls whenever the
//! attention flag it handed to the helper is raised.

mod config;
mod idle;
mod output;
mod record;
mod signal;
mod status;

pub use config::{HelperConfig, DEFAULT_CHANNELS};
pub use record::HEADER_SLACK;
pub use signal::NotifyFlag;
pub use status::{IdleReport, PlayStatus, RecordState, RecordStatus, RefNum, ShutdownReport};

use crate::audio::SoundService;
use crate::error::{HelperError, Result};
use output::OutputSlot;
use record::RecordingSession;
use tracing::info;

/// Playback and recording session manager.
///
/// One helper is one context: every caller sharing it shares the slot pool
/// and the recording session.
pub struct SoundHelper<S: SoundService> {
    service: S,
    config: HelperConfig,
    attention: NotifyFlag,
    slots: Vec<OutputSlot>,
    next_ref: u32,
    /// Set once the reference counter has wrapped past `u32::MAX`
    ref_wrapped: bool,
    recording: RecordingSession,
}

impl<S: SoundService> SoundHelper<S> {
    /// Create a helper. `attention` is raised whenever the helper needs an
    /// `idle()` call.
    pub fn new(service: S, attention: NotifyFlag, config: HelperConfig) -> Result<Self> {
        let count = config.slot_count();

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|_| HelperError::OutOfMemory {
                requested: count * std::mem::size_of::<OutputSlot>(),
            })?;
        slots.resize_with(count, OutputSlot::default);

        info!("Sound helper initialized: {} output channels", count);

        Ok(Self {
            service,
            config,
            attention,
            slots,
            next_ref: 1,
            ref_wrapped: false,
            recording: RecordingSession::default(),
        })
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn config(&self) -> &HelperConfig {
        &self.config
    }

    pub fn attention(&self) -> &NotifyFlag {
        &self.attention
    }

    /// Whether the host should call `idle()` now.
    pub fn needs_idle(&self) -> bool {
        self.attention.is_raised()
    }

    /// Number of output slots in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Output slots holding a live or not-yet-reaped session.
    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_use).count()
    }
}
