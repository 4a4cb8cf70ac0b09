use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{NotifyFlag, RecordState, RecordStatus, SoundHelper};
use crate::audio::{
    CaptureBlock, DeviceInfo, DeviceRef, InfoSelector, RecordQuality, ServiceError, SoundBuffer,
    SoundFormat, SoundHeader, SoundService,
};
use crate::error::{HelperError, Result};

/// Bytes allocated beyond the requested kilobytes to hold the sound header.
pub const HEADER_SLACK: usize = 128;

/// The singleton recording session.
#[derive(Debug, Default)]
pub(crate) struct RecordingSession {
    pub(crate) active: bool,
    pub(crate) paused: bool,
    /// Header followed by room for the samples; owned until handed to the caller
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) device: Option<DeviceRef>,
    pub(crate) header_length: usize,
    pub(crate) format: Option<SoundFormat>,
    /// Shared with the input device; carries the completion flag
    pub(crate) block: Option<Arc<CaptureBlock>>,
    pub(crate) last_error: Option<HelperError>,
    pub(crate) app_notify: Option<NotifyFlag>,
}

impl RecordingSession {
    pub(crate) fn completion_pending(&self) -> bool {
        self.block.as_ref().is_some_and(|block| block.is_complete())
    }

    fn elapsed_ms(&self, bytes: usize) -> u64 {
        match self.format {
            Some(format) if format.bytes_per_second() > 0 => {
                bytes as u64 * 1000 / format.bytes_per_second()
            }
            _ => 0,
        }
    }
}

impl<S: SoundService> SoundHelper<S> {
    /// Start recording from the default input device into a new buffer of
    /// `max_kilobytes` (plus header room).
    ///
    /// `done` is cleared once the device accepts the request and raised by
    /// `idle()` when the recording is finalized. Any failure releases
    /// everything acquired so far and leaves the previous recording in place.
    pub fn record_start(
        &mut self,
        max_kilobytes: u16,
        quality: RecordQuality,
        done: Option<NotifyFlag>,
    ) -> Result<()> {
        if self.recording.active {
            return Err(HelperError::AlreadyRecording);
        }

        // The previous session, finished or not yet collected, survives a
        // failed start. It is only replaced once the device accepts the request.
        let device = self.service.open_input()?;

        if let Err(err) = self.begin_recording(device, max_kilobytes, quality, done) {
            warn!("Failed to start recording: {}", err);
            if let Err(close_err) = self.service.close_input(device) {
                warn!("Failed to close input device {:?}: {}", device, close_err);
            }
            return Err(err);
        }

        info!(
            "Recording started: {} KB, {:?}",
            max_kilobytes, self.recording.format
        );

        Ok(())
    }

    fn begin_recording(
        &mut self,
        device: DeviceRef,
        max_kilobytes: u16,
        quality: RecordQuality,
        done: Option<NotifyFlag>,
    ) -> Result<()> {
        match self.service.get_device_info(device, InfoSelector::Async)? {
            DeviceInfo::Async(true) => {}
            _ => return Err(HelperError::NonAsyncDevice),
        }

        let alloc_size = max_kilobytes as usize * 1024 + HEADER_SLACK;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(alloc_size)
            .map_err(|_| HelperError::OutOfMemory {
                requested: alloc_size,
            })?;
        buffer.resize(alloc_size, 0);

        if let Err(err) = self
            .service
            .set_device_info(device, DeviceInfo::LevelMeter(true))
        {
            debug!("Input device has no level meter: {}", err);
        }
        self.service
            .set_device_info(device, DeviceInfo::RecordingQuality(quality))?;

        let format = self.device_format(device)?;

        // Provisional header: declares the whole buffer until the real length is known.
        let provisional = SoundHeader::new(format, (alloc_size - SoundHeader::LEN) as u32);
        let header_length = provisional.write_to(&mut buffer)?;

        let block = Arc::new(CaptureBlock::new(
            alloc_size - header_length,
            self.attention.clone(),
        ));

        // Flags go up before the request: the device may complete at once.
        let session = RecordingSession {
            active: true,
            paused: false,
            buffer: Some(buffer),
            device: Some(device),
            header_length,
            format: Some(format),
            block: Some(Arc::clone(&block)),
            last_error: None,
            app_notify: done,
        };
        let previous = std::mem::replace(&mut self.recording, session);

        if let Err(err) = self.service.record_async(device, block) {
            self.recording = previous;
            return Err(err.into());
        }

        // Raised only by idle(), never from the completion context.
        if let Some(done) = &self.recording.app_notify {
            done.clear();
        }
        debug!("Previous recording session released");

        Ok(())
    }

    fn device_format(&mut self, device: DeviceRef) -> Result<SoundFormat> {
        let channels = match self
            .service
            .get_device_info(device, InfoSelector::NumberChannels)?
        {
            DeviceInfo::NumberChannels(channels) => channels,
            _ => return Err(ServiceError::UnexpectedInfo.into()),
        };
        let sample_rate = match self.service.get_device_info(device, InfoSelector::SampleRate)? {
            DeviceInfo::SampleRate(rate) => rate,
            _ => return Err(ServiceError::UnexpectedInfo.into()),
        };
        let sample_size = match self.service.get_device_info(device, InfoSelector::SampleSize)? {
            DeviceInfo::SampleSize(size) => size,
            _ => return Err(ServiceError::UnexpectedInfo.into()),
        };
        let compression = match self
            .service
            .get_device_info(device, InfoSelector::CompressionType)?
        {
            DeviceInfo::CompressionType(compression) => compression,
            _ => return Err(ServiceError::UnexpectedInfo.into()),
        };

        Ok(SoundFormat {
            channels,
            sample_rate,
            sample_size,
            compression,
        })
    }

    /// Ask the device to stop early. The recording is finalized by the next
    /// `idle()` as a normal completion. Does nothing when not recording.
    pub fn record_stop(&mut self) -> Result<()> {
        match (self.recording.active, self.recording.device) {
            (true, Some(device)) => {
                info!("Stopping recording");
                self.service.stop_recording(device)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn record_pause(&mut self) -> Result<()> {
        let device = self.active_device()?;
        if self.recording.paused {
            return Err(HelperError::AlreadyPaused);
        }
        self.service.pause_recording(device)?;
        self.recording.paused = true;
        Ok(())
    }

    pub fn record_continue(&mut self) -> Result<()> {
        let device = self.active_device()?;
        if !self.recording.paused {
            return Err(HelperError::AlreadyContinued);
        }
        self.service.resume_recording(device)?;
        self.recording.paused = false;
        Ok(())
    }

    fn active_device(&self) -> Result<DeviceRef> {
        match (self.recording.active, self.recording.device) {
            (true, Some(device)) => Ok(device),
            _ => Err(HelperError::NotRecording),
        }
    }

    /// Take the finished recording.
    ///
    /// Available once `idle()` has finalized it; ownership moves to the
    /// caller, so a second call reports `NoRecordingAvailable`. A device
    /// failure during capture is reported here instead.
    pub fn get_recorded_sound(&mut self) -> Result<SoundBuffer> {
        let session = &mut self.recording;
        if session.block.is_none() {
            return Err(HelperError::NotRecording);
        }
        if session.active || !session.completion_pending() {
            return Err(HelperError::NoRecordingAvailable);
        }
        if let Some(err) = &session.last_error {
            return Err(err.clone());
        }

        session
            .buffer
            .take()
            .map(SoundBuffer::from_bytes)
            .ok_or(HelperError::NoRecordingAvailable)
    }

    /// Free a finished recording without taking it. Returns whether there
    /// was one.
    pub fn discard_recorded_sound(&mut self) -> bool {
        if self.recording.active {
            return false;
        }
        self.recording.buffer.take().is_some()
    }

    pub fn record_status(&mut self) -> Result<RecordStatus> {
        let finished = self.recording.completion_pending();

        if self.recording.active && !finished {
            let device = self.active_device()?;
            let live = self.service.recording_status(device)?;
            let state = if self.recording.paused {
                RecordState::Paused
            } else {
                RecordState::Recording
            };
            return Ok(RecordStatus {
                state,
                meter_level: live.meter_level,
                total_record_ms: live.total_msecs,
                current_record_ms: live.current_msecs,
            });
        }

        match &self.recording.block {
            Some(block) if finished => Ok(RecordStatus {
                state: RecordState::Finished,
                meter_level: 0,
                total_record_ms: self.recording.elapsed_ms(block.buffer_length()),
                current_record_ms: self.recording.elapsed_ms(block.count()),
            }),
            _ => Err(HelperError::NotRecording),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.active
    }
}
