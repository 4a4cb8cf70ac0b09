use std::time::Instant;

use tracing::{debug, info, warn};

use super::{IdleReport, ShutdownReport, SoundHelper};
use crate::audio::{CaptureBlock, DeviceRef, ServiceError, SoundHeader, SoundService};
use crate::error::{HelperError, Result};

impl<S: SoundService> SoundHelper<S> {
    /// Reap pass. Call whenever the attention flag is raised.
    ///
    /// Releases every slot whose playback completed and finalizes a recording
    /// whose capture completed. The flag is cleared first, so a completion
    /// that arrives during the pass raises it again.
    pub fn idle(&mut self) -> IdleReport {
        self.attention.clear();

        let mut report = IdleReport::default();

        for index in 0..self.slots.len() {
            if self.slots[index].completion_pending() {
                self.release_slot(index);
                report.slots_released += 1;
            }
        }

        if self.recording.active && self.recording.completion_pending() {
            self.finish_recording();
            report.recording_finished = true;
        }

        if report != IdleReport::default() {
            debug!(
                "Idle pass: {} slots released, recording finished: {}",
                report.slots_released, report.recording_finished
            );
        }

        report
    }

    /// Finalize a completed capture: either the whole success path (header
    /// rewritten, buffer trimmed) or the whole failure path (buffer dropped,
    /// error kept). The device is closed and the done flag raised either way.
    fn finish_recording(&mut self) {
        let Some(block) = self.recording.block.clone() else {
            return;
        };
        let device = self.recording.device.take();
        let buffer = self.recording.buffer.take();

        let finalized = match block.status() {
            // A manual stop completes with Aborted; that is a normal ending.
            Some(err) if err != ServiceError::Aborted => Err(HelperError::Service(err)),
            _ => match (device, buffer) {
                (Some(device), Some(buffer)) => self.finalize_capture(device, buffer, &block),
                _ => Err(HelperError::Service(ServiceError::DeviceNotAvailable)),
            },
        };

        match finalized {
            Ok(buffer) => {
                info!(
                    "Recording finished: {} bytes of sound data",
                    buffer.len() - self.recording.header_length
                );
                self.recording.buffer = Some(buffer);
                self.recording.last_error = None;
            }
            Err(err) => {
                warn!("Recording failed: {}", err);
                self.recording.last_error = Some(err);
            }
        }

        if let Some(device) = device {
            if let Err(err) = self.service.close_input(device) {
                warn!("Failed to close input device {:?}: {}", device, err);
            }
        }

        self.recording.active = false;
        self.recording.paused = false;
        if let Some(done) = &self.recording.app_notify {
            done.raise();
        }
    }

    fn finalize_capture(
        &mut self,
        device: DeviceRef,
        mut buffer: Vec<u8>,
        block: &CaptureBlock,
    ) -> Result<Vec<u8>> {
        let header_length = self.recording.header_length;
        let format = self
            .recording
            .format
            .ok_or(HelperError::Service(ServiceError::UnexpectedInfo))?;

        let count = block
            .count()
            .min(buffer.len().saturating_sub(header_length));
        let captured = self
            .service
            .fetch_captured(device, &mut buffer[header_length..header_length + count])?;

        SoundHeader::new(format, captured as u32).write_to(&mut buffer)?;
        buffer.truncate(header_length + captured);
        buffer.shrink_to_fit();

        Ok(buffer)
    }

    /// Stop everything, then wait (bounded by the configured timeout) for the
    /// reap pass to drain all sessions, running it whenever the attention flag
    /// is raised. The slot pool is released afterwards even if the wait timed
    /// out.
    pub fn shutdown(&mut self) -> ShutdownReport {
        info!("Shutting down sound helper");

        self.stop_all();
        if let Err(err) = self.record_stop() {
            warn!("Failed to stop recording during shutdown: {}", err);
        }

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let mut idle_passes = 0;

        loop {
            if self.attention.is_raised() {
                self.idle();
                idle_passes += 1;
            }

            if self.in_use_count() == 0 && !self.recording.active {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Shutdown timed out: {} slots in use, recording active: {}",
                    self.in_use_count(),
                    self.recording.active
                );
                break;
            }
            std::thread::yield_now();
        }

        let report = ShutdownReport {
            drained: self.in_use_count() == 0 && !self.recording.active,
            outstanding_slots: self.in_use_count(),
            recording_outstanding: self.recording.active,
            idle_passes,
        };

        self.slots = Vec::new();

        info!("Sound helper shut down (drained: {})", report.drained);

        report
    }
}
