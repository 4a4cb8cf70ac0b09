use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::buffer::SoundBuffer;
use super::header::{CompressionType, SoundFormat};

/// A WAV file decoded into a playable [`SoundBuffer`].
pub struct SoundFile {
    pub path: String,
    pub duration_seconds: f64,
    pub format: SoundFormat,
    pub sound: SoundBuffer,
}

impl SoundFile {
    /// Decode a WAV file. 8-bit files stay 8-bit offset binary, everything
    /// else becomes 16-bit little-endian PCM.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening sound file: {}", path.display());

        let mut reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        let (sample_size, data): (u16, Vec<u8>) = match spec.sample_format {
            hound::SampleFormat::Int => match spec.bits_per_sample {
                8 => {
                    let samples = reader
                        .samples::<i8>()
                        .collect::<Result<Vec<_>, _>>()
                        .context("Failed to read audio samples")?;
                    (8, samples.iter().map(|&s| (s as i16 + 128) as u8).collect())
                }
                16 => {
                    let samples = reader
                        .samples::<i16>()
                        .collect::<Result<Vec<_>, _>>()
                        .context("Failed to read audio samples")?;
                    (16, samples.iter().flat_map(|s| s.to_le_bytes()).collect())
                }
                24 | 32 => {
                    let shift = spec.bits_per_sample - 16;
                    let samples = reader
                        .samples::<i32>()
                        .collect::<Result<Vec<_>, _>>()
                        .context("Failed to read audio samples")?;
                    (
                        16,
                        samples
                            .iter()
                            .flat_map(|&s| ((s >> shift) as i16).to_le_bytes())
                            .collect(),
                    )
                }
                bits => bail!("Unsupported bit depth: {}", bits),
            },
            hound::SampleFormat::Float => {
                let samples = reader
                    .samples::<f32>()
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?;
                (
                    16,
                    samples
                        .iter()
                        .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
                        .collect(),
                )
            }
        };

        let format = SoundFormat {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            sample_size,
            compression: CompressionType::NONE,
        };
        let duration_seconds = data.len() as f64 / format.bytes_per_second().max(1) as f64;

        info!(
            "Sound file loaded: {:.1}s, {}Hz, {} channels, {} bytes",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            data.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            format,
            sound: SoundBuffer::from_samples(format, &data)
                .with_context(|| format!("Sound file too large: {}", path.display()))?,
        })
    }
}

/// Sounds addressable by numeric id, loaded from `<id>.wav` files.
///
/// Library sounds are marked purgeable: they are only pinned while a
/// playback session holds them.
#[derive(Debug, Default)]
pub struct SoundLibrary {
    sounds: BTreeMap<i16, SoundBuffer>,
}

impl SoundLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<id>.wav` in `dir`. Files whose stem is not a number are skipped.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut library = Self::new();

        if !dir.exists() {
            warn!("Sound directory {} does not exist, library is empty", dir.display());
            return Ok(library);
        }

        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read sound directory: {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("wav") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i16>().ok())
            else {
                debug!("Skipping {}: name is not a sound id", path.display());
                continue;
            };

            let file = SoundFile::open(&path)?;
            library.insert(id, file.sound);
        }

        info!("Sound library loaded: {} sounds from {}", library.len(), dir.display());

        Ok(library)
    }

    pub fn insert(&mut self, id: i16, sound: SoundBuffer) {
        sound.set_purgeable(true);
        self.sounds.insert(id, sound);
    }

    pub fn get(&self, id: i16) -> Option<&SoundBuffer> {
        self.sounds.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = i16> + '_ {
        self.sounds.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}
