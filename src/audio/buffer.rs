use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::header::{HeaderError, SoundFormat, SoundHeader};

const PURGEABLE_BIT: u8 = 0x40;
const LOCKED_BIT: u8 = 0x80;

/// Purgeability and lock state of a sound buffer.
///
/// A purgeable buffer may be reclaimed by its owner's memory manager; a
/// locked buffer is pinned while a device reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferState {
    pub purgeable: bool,
    pub locked: bool,
}

impl BufferState {
    fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.purgeable {
            bits |= PURGEABLE_BIT;
        }
        if self.locked {
            bits |= LOCKED_BIT;
        }
        bits
    }

    fn from_bits(bits: u8) -> Self {
        Self {
            purgeable: bits & PURGEABLE_BIT != 0,
            locked: bits & LOCKED_BIT != 0,
        }
    }
}

#[derive(Debug)]
struct SoundData {
    bytes: Vec<u8>,
    state: AtomicU8,
}

/// A shared, immutable audio buffer: sound header followed by sample data.
///
/// Cloning shares the same buffer. Playback sessions only keep a
/// [`WeakSoundBuffer`] to it, so ownership stays with the caller.
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    inner: Arc<SoundData>,
}

/// Non-owning reference to a [`SoundBuffer`].
#[derive(Debug, Clone)]
pub struct WeakSoundBuffer {
    inner: Weak<SoundData>,
}

impl SoundBuffer {
    /// Wrap raw bytes (header plus samples) as an unlocked, non-purgeable buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(SoundData {
                bytes,
                state: AtomicU8::new(0),
            }),
        }
    }

    /// Build a buffer by stamping a header in front of `samples`.
    pub fn from_samples(format: SoundFormat, samples: &[u8]) -> Result<Self, HeaderError> {
        let header = SoundHeader::new(format, SoundHeader::declared_len(samples.len())?);
        let mut bytes = vec![0u8; SoundHeader::LEN + samples.len()];
        let header_len = header.write_to(&mut bytes)?;
        bytes[header_len..].copy_from_slice(samples);
        Ok(Self::from_bytes(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    pub fn header(&self) -> Result<SoundHeader, HeaderError> {
        SoundHeader::parse(&self.inner.bytes).map(|(header, _)| header)
    }

    /// Sample data as declared by the header.
    pub fn samples(&self) -> Result<&[u8], HeaderError> {
        let (header, header_len) = SoundHeader::parse(&self.inner.bytes)?;
        Ok(&self.inner.bytes[header_len..header_len + header.data_len as usize])
    }

    pub fn state(&self) -> BufferState {
        BufferState::from_bits(self.inner.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: BufferState) {
        self.inner.state.store(state.to_bits(), Ordering::Release);
    }

    pub fn set_purgeable(&self, purgeable: bool) {
        if purgeable {
            self.inner.state.fetch_or(PURGEABLE_BIT, Ordering::AcqRel);
        } else {
            self.inner.state.fetch_and(!PURGEABLE_BIT, Ordering::AcqRel);
        }
    }

    pub fn lock(&self) {
        self.inner.state.fetch_or(LOCKED_BIT, Ordering::AcqRel);
    }

    pub fn unlock(&self) {
        self.inner.state.fetch_and(!LOCKED_BIT, Ordering::AcqRel);
    }

    pub fn downgrade(&self) -> WeakSoundBuffer {
        WeakSoundBuffer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &SoundBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl WeakSoundBuffer {
    pub fn upgrade(&self) -> Option<SoundBuffer> {
        self.inner.upgrade().map(|inner| SoundBuffer { inner })
    }

    pub fn refers_to(&self, sound: &SoundBuffer) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&sound.inner))
    }

    pub fn ptr_eq(&self, other: &WeakSoundBuffer) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::header::CompressionType;

    #[test]
    fn test_state_bits() {
        let sound = SoundBuffer::from_bytes(vec![0; 4]);
        assert_eq!(sound.state(), BufferState::default());

        sound.set_purgeable(true);
        sound.lock();
        assert_eq!(
            sound.state(),
            BufferState {
                purgeable: true,
                locked: true
            }
        );

        sound.set_purgeable(false);
        sound.unlock();
        assert_eq!(sound.state(), BufferState::default());
    }

    #[test]
    fn test_weak_identity() {
        let a = SoundBuffer::from_bytes(vec![1, 2, 3]);
        let b = SoundBuffer::from_bytes(vec![1, 2, 3]);
        let weak = a.downgrade();

        assert!(weak.refers_to(&a));
        assert!(!weak.refers_to(&b));
        assert!(a.clone().ptr_eq(&a));

        drop(a);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_from_samples_declares_length() {
        let format = SoundFormat {
            channels: 1,
            sample_rate: 11025,
            sample_size: 8,
            compression: CompressionType::NONE,
        };
        let sound = SoundBuffer::from_samples(format, &[7u8; 300]).unwrap();

        assert_eq!(sound.len(), SoundHeader::LEN + 300);
        assert_eq!(sound.header().unwrap().data_len, 300);
        assert_eq!(sound.samples().unwrap(), &[7u8; 300][..]);
    }
}
