use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{PlayStatus, RefNum, SoundHelper};
use crate::audio::{
    BufferState, ChannelId, PlaybackCompletion, SoundBuffer, SoundCommand, SoundLibrary,
    SoundService, WeakSoundBuffer, COMPLETION_SIGNATURE,
};
use crate::error::{HelperError, Result};

/// One pooled playback session.
#[derive(Debug, Default)]
pub(crate) struct OutputSlot {
    pub(crate) in_use: bool,
    ref_num: RefNum,
    channel: Option<ChannelId>,
    /// The caller keeps ownership of the buffer
    sound: Option<WeakSoundBuffer>,
    /// Buffer state from before this slot pinned it
    saved_state: BufferState,
    paused: bool,
    /// Playback rate to restore when paused by zeroing the rate
    saved_rate: Option<u32>,
    /// Written only by the channel's completion handler; each session gets a fresh flag
    pending: Arc<AtomicBool>,
}

impl OutputSlot {
    fn holds(&self, sound: &SoundBuffer) -> bool {
        self.sound.as_ref().is_some_and(|weak| weak.refers_to(sound))
    }

    pub(crate) fn completion_pending(&self) -> bool {
        self.in_use && self.pending.load(Ordering::Acquire)
    }
}

impl<S: SoundService> SoundHelper<S> {
    /// Start playing `sound` asynchronously and return its reference number.
    ///
    /// With `None` the slot only gets a channel, for callers that want to
    /// drive it themselves through [`get_channel`](Self::get_channel). Such a
    /// session never completes on its own.
    pub fn play(&mut self, sound: Option<&SoundBuffer>) -> Result<RefNum> {
        // Pin the buffer before the service gets a chance to allocate.
        let saved_state = match sound {
            Some(sound) => {
                let state = self.effective_buffer_state(sound);
                sound.set_purgeable(false);
                state
            }
            None => BufferState::default(),
        };

        let Some(index) = self.find_free_slot() else {
            if let Some(sound) = sound {
                self.restore_unless_shared(sound, saved_state, None);
            }
            debug!("No free output slot ({} in use)", self.in_use_count());
            return Err(HelperError::OutaChannels);
        };

        let ref_num = match self.open_slot(index, sound, saved_state) {
            Ok(ref_num) => ref_num,
            Err(err) => {
                if let Some(sound) = sound {
                    self.restore_unless_shared(sound, saved_state, None);
                }
                warn!("Failed to open sound channel: {}", err);
                return Err(err);
            }
        };

        if let Some(sound) = sound {
            sound.lock();
            if let Err(err) = self.begin_playback(index, sound) {
                warn!("Failed to start playback for {}: {}", ref_num, err);
                self.release_slot(index);
                return Err(err);
            }
        }

        info!("Playback {} started on slot {}", ref_num, index);

        Ok(ref_num)
    }

    /// Look up sound `id` in `library` and play it.
    pub fn play_by_id(&mut self, library: &SoundLibrary, id: i16) -> Result<RefNum> {
        let sound = library.get(id).ok_or(HelperError::SoundNotFound(id))?;
        self.play(Some(sound))
    }

    /// Stop a playback immediately, without waiting for its completion.
    ///
    /// `BadReference` usually just means the sound already finished.
    pub fn stop(&mut self, ref_num: RefNum) -> Result<()> {
        let index = self
            .find_slot(ref_num)
            .ok_or(HelperError::BadReference(ref_num))?;
        self.stop_slot(index);
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index].in_use {
                self.stop_slot(index);
            }
        }
    }

    pub fn pause(&mut self, ref_num: RefNum) -> Result<()> {
        let index = self
            .find_slot(ref_num)
            .ok_or(HelperError::BadReference(ref_num))?;
        if self.slots[index].paused {
            return Err(HelperError::AlreadyPaused);
        }
        let channel = self.slot_channel(index)?;

        // A queue-level pause only takes effect once the current sampled sound
        // has played out, so prefer zeroing the rate when the channel has one.
        let rate = if self.config.rate_pause {
            match self.service.playback_rate(channel) {
                Ok(rate) => rate.filter(|&rate| rate != 0),
                Err(err) => {
                    debug!("Channel {:?} has no playback rate: {}", channel, err);
                    None
                }
            }
        } else {
            None
        };

        let command = match rate {
            Some(_) => SoundCommand::Rate(0),
            None => SoundCommand::Pause,
        };
        self.service.do_immediate(channel, command)?;

        let slot = &mut self.slots[index];
        slot.saved_rate = rate;
        slot.paused = true;
        debug!("Playback {} paused with {:?}", ref_num, command);

        Ok(())
    }

    pub fn resume(&mut self, ref_num: RefNum) -> Result<()> {
        let index = self
            .find_slot(ref_num)
            .ok_or(HelperError::BadReference(ref_num))?;
        if !self.slots[index].paused {
            return Err(HelperError::AlreadyContinued);
        }
        let channel = self.slot_channel(index)?;

        let command = match self.slots[index].saved_rate {
            Some(rate) => SoundCommand::Rate(rate),
            None => SoundCommand::Resume,
        };
        self.service.do_immediate(channel, command)?;

        let slot = &mut self.slots[index];
        slot.saved_rate = None;
        slot.paused = false;
        debug!("Playback {} resumed with {:?}", ref_num, command);

        Ok(())
    }

    /// Distinguishes never-issued, finished and live reference numbers.
    ///
    /// Once the counter has wrapped every nonzero number has been issued, so
    /// anything not live reads as finished.
    pub fn status(&self, ref_num: RefNum) -> PlayStatus {
        match self.find_slot(ref_num) {
            Some(index) if self.slots[index].paused => PlayStatus::Paused,
            Some(_) => PlayStatus::Playing,
            None if ref_num.0 == 0 => PlayStatus::Error,
            None if !self.ref_wrapped && ref_num.0 >= self.next_ref => PlayStatus::Error,
            None => PlayStatus::Finished,
        }
    }

    /// Raw channel of a live session.
    ///
    /// Callers may queue their own commands on it, but must never start a
    /// second playback on the channel: the sound service faults on a double
    /// trigger.
    pub fn get_channel(&self, ref_num: RefNum) -> Result<ChannelId> {
        let index = self
            .find_slot(ref_num)
            .ok_or(HelperError::BadReference(ref_num))?;
        self.slot_channel(index)
    }

    /// State the buffer had before any live slot pinned it.
    ///
    /// When the same buffer is retriggered, the live state already reflects
    /// the first session's pinning, so the saved state wins.
    pub fn effective_buffer_state(&self, sound: &SoundBuffer) -> BufferState {
        self.slots
            .iter()
            .find(|slot| slot.in_use && slot.holds(sound))
            .map(|slot| slot.saved_state)
            .unwrap_or_else(|| sound.state())
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.in_use)
    }

    pub(crate) fn find_slot(&self, ref_num: RefNum) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.in_use && slot.ref_num == ref_num)
    }

    fn slot_channel(&self, index: usize) -> Result<ChannelId> {
        self.slots[index]
            .channel
            .ok_or(HelperError::BadReference(self.slots[index].ref_num))
    }

    fn issue_ref(&mut self) -> RefNum {
        loop {
            let candidate = RefNum(self.next_ref);
            if self.next_ref == u32::MAX {
                self.ref_wrapped = true;
            }
            self.next_ref = self.next_ref.wrapping_add(1).max(1);
            if self.find_slot(candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Open a channel for slot `index` and mark it in use. Nothing is
    /// reserved if the channel cannot be opened.
    fn open_slot(
        &mut self,
        index: usize,
        sound: Option<&SoundBuffer>,
        saved_state: BufferState,
    ) -> Result<RefNum> {
        let pending = Arc::new(AtomicBool::new(false));
        let completion = PlaybackCompletion::new(Arc::clone(&pending), self.attention.clone());
        let channel = self.service.new_channel(completion)?;
        let ref_num = self.issue_ref();

        self.slots[index] = OutputSlot {
            in_use: true,
            ref_num,
            channel: Some(channel),
            sound: sound.map(SoundBuffer::downgrade),
            saved_state,
            paused: false,
            saved_rate: None,
            pending,
        };

        Ok(ref_num)
    }

    fn begin_playback(&mut self, index: usize, sound: &SoundBuffer) -> Result<()> {
        let channel = self.slot_channel(index)?;
        self.service.play(channel, sound)?;

        let callback = SoundCommand::Callback {
            param1: COMPLETION_SIGNATURE,
            param2: self.slots[index].ref_num.0,
        };
        if let Err(err) = self.service.do_command(channel, callback) {
            warn!("Failed to queue completion callback on {:?}: {}", channel, err);
        }

        Ok(())
    }

    fn stop_slot(&mut self, index: usize) {
        if let Some(channel) = self.slots[index].channel {
            for command in [SoundCommand::Flush, SoundCommand::Quiet] {
                if let Err(err) = self.service.do_immediate(channel, command) {
                    debug!("{:?} on {:?} failed: {}", command, channel, err);
                }
            }
        }
        debug!("Playback {} stopped", self.slots[index].ref_num);
        self.release_slot(index);
    }

    /// Return slot `index` to the pool: close its channel and restore the
    /// buffer state unless another live slot still plays the same buffer.
    /// Releasing a free slot does nothing.
    pub(crate) fn release_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if !slot.in_use {
            return;
        }
        slot.in_use = false;
        slot.paused = false;
        slot.saved_rate = None;
        let ref_num = slot.ref_num;
        let channel = slot.channel.take();
        let sound = slot.sound.take();
        let saved_state = slot.saved_state;

        if let Some(channel) = channel {
            if let Err(err) = self.service.dispose_channel(channel, true) {
                warn!("Failed to dispose channel {:?}: {}", channel, err);
            }
        }

        if let Some(sound) = sound.and_then(|weak| weak.upgrade()) {
            self.restore_unless_shared(&sound, saved_state, Some(index));
        }

        debug!("Slot {} released (playback {})", index, ref_num);
    }

    fn restore_unless_shared(
        &self,
        sound: &SoundBuffer,
        state: BufferState,
        except: Option<usize>,
    ) {
        let shared = self
            .slots
            .iter()
            .enumerate()
            .any(|(i, slot)| Some(i) != except && slot.in_use && slot.holds(sound));

        if shared {
            debug!("Buffer still playing on another slot, keeping it pinned");
        } else {
            sound.set_state(state);
        }
    }
}
