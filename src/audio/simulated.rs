//! In-process sound service
//!
//! `SimulatedSoundService` behaves like a small sound driver whose clock only
//! moves when [`advance`](SimulatedSoundService::advance) is called. Sounds
//! "play" for the duration their header declares, the input device produces a
//! deterministic ramp of sample bytes, and every failure the helper has to
//! unwind from can be injected.
//!
//! Completion handlers run inside `advance` (or immediately, for a stopped
//! capture), which stands in for the driver's interrupt context.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{
    CaptureBlock, ChannelId, DeviceInfo, DeviceRecordingStatus, DeviceRef, InfoSelector,
    PlaybackCompletion, RecordQuality, ServiceError, SoundCommand, SoundService, UNITY_RATE,
};
use super::buffer::SoundBuffer;
use super::header::{CompressionType, SoundFormat};

const BAD_FORMAT: ServiceError = ServiceError::Other(-206);

/// Configuration for the simulated sound service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub input_channels: u16,
    pub input_sample_rate: u32,
    /// Bits per sample
    pub input_sample_size: u16,
    pub input_compression: CompressionType,
    /// Whether the input device supports asynchronous recording
    pub async_input: bool,
    /// Whether playback channels understand rate commands
    pub rate_commands: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            input_channels: 1,
            input_sample_rate: 22050,
            input_sample_size: 8,
            input_compression: CompressionType::NONE,
            async_input: true,
            rate_commands: true,
        }
    }
}

impl SimulatorConfig {
    fn input_format(&self) -> SoundFormat {
        SoundFormat {
            channels: self.input_channels,
            sample_rate: self.input_sample_rate,
            sample_size: self.input_sample_size,
            compression: self.input_compression,
        }
    }
}

struct SimChannel {
    completion: PlaybackCompletion,
    queue: VecDeque<SoundCommand>,
    /// Time left on the sound being played
    playing: Option<Duration>,
    queue_paused: bool,
    rate: u32,
}

impl SimChannel {
    fn new(completion: PlaybackCompletion) -> Self {
        Self {
            completion,
            queue: VecDeque::new(),
            playing: None,
            queue_paused: false,
            rate: UNITY_RATE,
        }
    }

    fn step(&mut self, elapsed: Duration) {
        if let Some(remaining) = self.playing {
            if self.rate == 0 {
                return;
            }
            let scaled = elapsed.mul_f64(self.rate as f64 / UNITY_RATE as f64);
            if scaled < remaining {
                self.playing = Some(remaining - scaled);
                return;
            }
            self.playing = None;
        }
        self.drain_queue();
    }

    /// Run queued commands until the queue pauses, empties or a sound plays.
    fn drain_queue(&mut self) {
        while !self.queue_paused && self.playing.is_none() {
            let Some(command) = self.queue.pop_front() else {
                break;
            };
            self.execute(command);
        }
    }

    fn execute(&mut self, command: SoundCommand) {
        match command {
            SoundCommand::Flush => self.queue.clear(),
            SoundCommand::Quiet => self.playing = None,
            SoundCommand::Pause => self.queue_paused = true,
            SoundCommand::Resume => {
                self.queue_paused = false;
                self.drain_queue();
            }
            SoundCommand::Rate(rate) => self.rate = rate,
            SoundCommand::Callback { .. } => self.completion.on_callback(&command),
        }
    }
}

struct SimCapture {
    block: Arc<CaptureBlock>,
    data: Vec<u8>,
    paused: bool,
    finished: bool,
    /// Fractional bytes carried between steps
    carry: f64,
}

struct SimInput {
    device: DeviceRef,
    format: SoundFormat,
    level_meter: bool,
    quality: RecordQuality,
    capture: Option<SimCapture>,
}

impl SimInput {
    fn step(&mut self, elapsed: Duration) {
        let bytes_per_second = self.format.bytes_per_second();
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        if capture.paused || capture.finished {
            return;
        }

        capture.carry += elapsed.as_secs_f64() * bytes_per_second as f64;
        let wanted = capture.carry.floor() as usize;
        capture.carry -= wanted as f64;

        let room = capture.block.buffer_length() - capture.data.len();
        let start = capture.data.len();
        capture
            .data
            .extend((start..start + wanted.min(room)).map(ramp_byte));
        capture.block.set_count(capture.data.len());

        if capture.data.len() == capture.block.buffer_length() {
            capture.finished = true;
            capture.block.complete(Ok(()));
        }
    }

    fn status(&self) -> DeviceRecordingStatus {
        let Some(capture) = &self.capture else {
            return DeviceRecordingStatus::default();
        };
        let bytes_per_second = self.format.bytes_per_second().max(1);
        let bytes_per_frame = (bytes_per_second / self.format.sample_rate.max(1) as u64).max(1);
        let meter_level = if self.level_meter {
            capture
                .data
                .last()
                .map_or(0, |&byte| ((byte as i16 - 128).unsigned_abs() * 2).min(255))
        } else {
            0
        };

        DeviceRecordingStatus {
            recording: !capture.paused && !capture.finished,
            meter_level,
            total_samples: capture.block.buffer_length() as u64 / bytes_per_frame,
            samples_recorded: capture.data.len() as u64 / bytes_per_frame,
            total_msecs: capture.block.buffer_length() as u64 * 1000 / bytes_per_second,
            current_msecs: capture.data.len() as u64 * 1000 / bytes_per_second,
        }
    }
}

fn ramp_byte(position: usize) -> u8 {
    (position % 256) as u8
}

/// Deterministic sound service for the daemon and tests.
pub struct SimulatedSoundService {
    config: SimulatorConfig,
    channels: HashMap<ChannelId, SimChannel>,
    next_channel: u32,
    next_device: u32,
    input: Option<SimInput>,
    fail_next_channel: Option<ServiceError>,
    fail_next_play: Option<ServiceError>,
    fail_next_input: Option<ServiceError>,
    complete_next_capture: Option<Result<(), ServiceError>>,
}

impl SimulatedSoundService {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
            next_channel: 1,
            next_device: 1,
            input: None,
            fail_next_channel: None,
            fail_next_play: None,
            fail_next_input: None,
            complete_next_capture: None,
        }
    }

    pub fn config_mut(&mut self) -> &mut SimulatorConfig {
        &mut self.config
    }

    /// Move the service clock forward, delivering any completions that fall due.
    pub fn advance(&mut self, elapsed: Duration) {
        for channel in self.channels.values_mut() {
            channel.step(elapsed);
        }
        if let Some(input) = self.input.as_mut() {
            input.step(elapsed);
        }
    }

    /// Let the sound on `channel` run out right now. Returns false for an
    /// unknown channel.
    pub fn finish_playback(&mut self, channel: ChannelId) -> bool {
        match self.channels.get_mut(&channel) {
            Some(sim) => {
                sim.playing = None;
                sim.drain_queue();
                true
            }
            None => false,
        }
    }

    /// Deliver an arbitrary callback command to a channel's completion
    /// handler, as a buggy driver might.
    pub fn inject_callback(&mut self, channel: ChannelId, command: SoundCommand) -> bool {
        match self.channels.get(&channel) {
            Some(sim) => {
                sim.completion.on_callback(&command);
                true
            }
            None => false,
        }
    }

    /// End the capture in progress with a device error.
    pub fn fail_capture(&mut self, err: ServiceError) -> bool {
        match self.input.as_mut().and_then(|input| input.capture.as_mut()) {
            Some(capture) if !capture.finished => {
                capture.finished = true;
                capture.block.complete(Err(err));
                true
            }
            _ => false,
        }
    }

    pub fn fail_next_channel(&mut self, err: ServiceError) {
        self.fail_next_channel = Some(err);
    }

    pub fn fail_next_play(&mut self, err: ServiceError) {
        self.fail_next_play = Some(err);
    }

    pub fn fail_next_input(&mut self, err: ServiceError) {
        self.fail_next_input = Some(err);
    }

    /// Make the next capture request complete with `result` before
    /// `record_async` returns, without capturing anything.
    pub fn complete_next_capture_immediately(&mut self, result: Result<(), ServiceError>) {
        self.complete_next_capture = Some(result);
    }

    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_playing(&self, channel: ChannelId) -> bool {
        self.channels
            .get(&channel)
            .is_some_and(|sim| sim.playing.is_some())
    }

    pub fn queued_commands(&self, channel: ChannelId) -> usize {
        self.channels.get(&channel).map_or(0, |sim| sim.queue.len())
    }

    pub fn is_queue_paused(&self, channel: ChannelId) -> bool {
        self.channels
            .get(&channel)
            .is_some_and(|sim| sim.queue_paused)
    }

    pub fn channel_rate(&self, channel: ChannelId) -> Option<u32> {
        self.channels.get(&channel).map(|sim| sim.rate)
    }

    pub fn input_open(&self) -> bool {
        self.input.is_some()
    }

    pub fn captured_bytes(&self) -> usize {
        self.input
            .as_ref()
            .and_then(|input| input.capture.as_ref())
            .map_or(0, |capture| capture.data.len())
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut SimChannel, ServiceError> {
        self.channels
            .get_mut(&channel)
            .ok_or(ServiceError::BadChannel)
    }

    fn input_mut(&mut self, device: DeviceRef) -> Result<&mut SimInput, ServiceError> {
        match self.input.as_mut() {
            Some(input) if input.device == device => Ok(input),
            _ => Err(ServiceError::DeviceNotAvailable),
        }
    }

    fn capture_mut(&mut self, device: DeviceRef) -> Result<&mut SimCapture, ServiceError> {
        self.input_mut(device)?
            .capture
            .as_mut()
            .ok_or(ServiceError::DeviceNotAvailable)
    }
}

impl Default for SimulatedSoundService {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl SoundService for SimulatedSoundService {
    fn new_channel(&mut self, completion: PlaybackCompletion) -> Result<ChannelId, ServiceError> {
        if let Some(err) = self.fail_next_channel.take() {
            return Err(err);
        }
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(id, SimChannel::new(completion));
        debug!("Simulated channel {:?} opened", id);
        Ok(id)
    }

    fn dispose_channel(&mut self, channel: ChannelId, _quiet_now: bool) -> Result<(), ServiceError> {
        self.channels
            .remove(&channel)
            .map(|_| ())
            .ok_or(ServiceError::BadChannel)
    }

    fn play(&mut self, channel: ChannelId, sound: &SoundBuffer) -> Result<(), ServiceError> {
        if let Some(err) = self.fail_next_play.take() {
            return Err(err);
        }
        let header = sound.header().map_err(|_| BAD_FORMAT)?;
        let bytes_per_second = header.format.bytes_per_second();
        if bytes_per_second == 0 {
            return Err(BAD_FORMAT);
        }
        let duration = Duration::from_secs_f64(header.data_len as f64 / bytes_per_second as f64);

        let sim = self.channel_mut(channel)?;
        sim.playing = Some(duration);
        Ok(())
    }

    fn do_command(&mut self, channel: ChannelId, command: SoundCommand) -> Result<(), ServiceError> {
        let sim = self.channel_mut(channel)?;
        sim.queue.push_back(command);
        sim.drain_queue();
        Ok(())
    }

    fn do_immediate(
        &mut self,
        channel: ChannelId,
        command: SoundCommand,
    ) -> Result<(), ServiceError> {
        let rate_commands = self.config.rate_commands;
        let sim = self.channel_mut(channel)?;
        if matches!(command, SoundCommand::Rate(_)) && !rate_commands {
            return Err(BAD_FORMAT);
        }
        sim.execute(command);
        Ok(())
    }

    fn playback_rate(&mut self, channel: ChannelId) -> Result<Option<u32>, ServiceError> {
        let rate_commands = self.config.rate_commands;
        let sim = self.channel_mut(channel)?;
        Ok(rate_commands.then_some(sim.rate))
    }

    fn open_input(&mut self) -> Result<DeviceRef, ServiceError> {
        if let Some(err) = self.fail_next_input.take() {
            return Err(err);
        }
        if self.input.is_some() {
            return Err(ServiceError::DeviceNotAvailable);
        }
        let device = DeviceRef(self.next_device);
        self.next_device += 1;
        self.input = Some(SimInput {
            device,
            format: self.config.input_format(),
            level_meter: false,
            quality: RecordQuality::default(),
            capture: None,
        });
        Ok(device)
    }

    fn close_input(&mut self, device: DeviceRef) -> Result<(), ServiceError> {
        self.input_mut(device)?;
        self.input = None;
        Ok(())
    }

    fn get_device_info(
        &mut self,
        device: DeviceRef,
        selector: InfoSelector,
    ) -> Result<DeviceInfo, ServiceError> {
        let async_input = self.config.async_input;
        let input = self.input_mut(device)?;
        Ok(match selector {
            InfoSelector::NumberChannels => DeviceInfo::NumberChannels(input.format.channels),
            InfoSelector::SampleRate => DeviceInfo::SampleRate(input.format.sample_rate),
            InfoSelector::SampleSize => DeviceInfo::SampleSize(input.format.sample_size),
            InfoSelector::CompressionType => DeviceInfo::CompressionType(input.format.compression),
            InfoSelector::Async => DeviceInfo::Async(async_input),
            InfoSelector::LevelMeter => DeviceInfo::LevelMeter(input.level_meter),
            InfoSelector::RecordingQuality => DeviceInfo::RecordingQuality(input.quality),
        })
    }

    fn set_device_info(&mut self, device: DeviceRef, info: DeviceInfo) -> Result<(), ServiceError> {
        let input = self.input_mut(device)?;
        match info {
            DeviceInfo::NumberChannels(channels) => input.format.channels = channels,
            DeviceInfo::SampleRate(rate) => input.format.sample_rate = rate,
            DeviceInfo::SampleSize(size) => input.format.sample_size = size,
            DeviceInfo::CompressionType(compression) => input.format.compression = compression,
            DeviceInfo::LevelMeter(on) => input.level_meter = on,
            DeviceInfo::RecordingQuality(quality) => input.quality = quality,
            DeviceInfo::Async(_) => return Err(ServiceError::UnexpectedInfo),
        }
        Ok(())
    }

    fn record_async(
        &mut self,
        device: DeviceRef,
        block: Arc<CaptureBlock>,
    ) -> Result<(), ServiceError> {
        if !self.config.async_input {
            return Err(ServiceError::DeviceNotAvailable);
        }
        let immediate = self.complete_next_capture.take();
        let input = self.input_mut(device)?;
        if input.capture.as_ref().is_some_and(|capture| !capture.finished) {
            return Err(ServiceError::DeviceNotAvailable);
        }

        let finished = match immediate {
            Some(result) => {
                block.complete(result);
                true
            }
            None if block.buffer_length() == 0 => {
                block.complete(Ok(()));
                true
            }
            None => false,
        };
        input.capture = Some(SimCapture {
            block,
            data: Vec::new(),
            paused: false,
            finished,
            carry: 0.0,
        });
        Ok(())
    }

    fn stop_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError> {
        let capture = self.capture_mut(device)?;
        if !capture.finished {
            capture.finished = true;
            capture.block.complete(Err(ServiceError::Aborted));
        }
        Ok(())
    }

    fn pause_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError> {
        self.capture_mut(device)?.paused = true;
        Ok(())
    }

    fn resume_recording(&mut self, device: DeviceRef) -> Result<(), ServiceError> {
        self.capture_mut(device)?.paused = false;
        Ok(())
    }

    fn recording_status(&mut self, device: DeviceRef) -> Result<DeviceRecordingStatus, ServiceError> {
        Ok(self.input_mut(device)?.status())
    }

    fn fetch_captured(&mut self, device: DeviceRef, dest: &mut [u8]) -> Result<usize, ServiceError> {
        let capture = self.capture_mut(device)?;
        let count = dest.len().min(capture.data.len());
        dest[..count].copy_from_slice(&capture.data[..count]);
        Ok(count)
    }
}
