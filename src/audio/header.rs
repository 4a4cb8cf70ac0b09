//! Length-prefixed sound header.
//!
//! A sound buffer is a fixed header (format descriptor plus sample byte count)
//! followed by raw sample data. All fields are little-endian:
//!
//! ```text
//! 0   magic "SNDH"
//! 4   header length (u16)
//! 6   channel count (u16)
//! 8   sample rate in Hz (u32)
//! 12  sample size in bits (u16)
//! 14  compression type (4 bytes)
//! 18  base note (u8), 1 reserved byte
//! 20  sample data length in bytes (u32)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

const MAGIC: [u8; 4] = *b"SNDH";

/// MIDI note the sampled sound plays at unity rate.
pub const BASE_NOTE: u8 = 60;

/// Four-character compression code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompressionType(pub [u8; 4]);

impl CompressionType {
    pub const NONE: Self = Self(*b"NONE");
    pub const MACE3: Self = Self(*b"MAC3");
    pub const MACE6: Self = Self(*b"MAC6");
}

impl fmt::Debug for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompressionType({})", self)
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<String> for CompressionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = value
            .as_bytes()
            .try_into()
            .map_err(|_| format!("compression type must be 4 bytes, got {:?}", value))?;
        Ok(Self(bytes))
    }
}

impl From<CompressionType> for String {
    fn from(value: CompressionType) -> Self {
        value.to_string()
    }
}

/// Format of the sample data following the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundFormat {
    pub channels: u16,
    pub sample_rate: u32,
    /// Bits per sample
    pub sample_size: u16,
    pub compression: CompressionType,
}

impl SoundFormat {
    pub fn bytes_per_second(&self) -> u64 {
        let bytes_per_sample = (self.sample_size as u64).div_ceil(8).max(1);
        self.sample_rate as u64 * self.channels as u64 * bytes_per_sample
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("buffer too short for sound header: need {needed} bytes, have {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("buffer does not start with a sound header")]
    BadMagic,

    #[error("header declares {declared} sample bytes but only {available} follow it")]
    Truncated { declared: usize, available: usize },

    #[error("{len} sample bytes do not fit in a sound header")]
    TooLong { len: usize },
}

/// Decoded sound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundHeader {
    pub format: SoundFormat,
    pub base_note: u8,
    /// Sample data length in bytes
    pub data_len: u32,
}

impl SoundHeader {
    pub const LEN: usize = 20 + 4;

    pub fn new(format: SoundFormat, data_len: u32) -> Self {
        Self {
            format,
            base_note: BASE_NOTE,
            data_len,
        }
    }

    /// Sample byte count as declared in a header. Lengths past `u32::MAX`
    /// cannot be represented.
    pub fn declared_len(len: usize) -> Result<u32, HeaderError> {
        u32::try_from(len).map_err(|_| HeaderError::TooLong { len })
    }

    /// Stamp the header at the start of `dest` and return the header length.
    pub fn write_to(&self, dest: &mut [u8]) -> Result<usize, HeaderError> {
        if dest.len() < Self::LEN {
            return Err(HeaderError::TooShort {
                needed: Self::LEN,
                actual: dest.len(),
            });
        }

        dest[0..4].copy_from_slice(&MAGIC);
        dest[4..6].copy_from_slice(&(Self::LEN as u16).to_le_bytes());
        dest[6..8].copy_from_slice(&self.format.channels.to_le_bytes());
        dest[8..12].copy_from_slice(&self.format.sample_rate.to_le_bytes());
        dest[12..14].copy_from_slice(&self.format.sample_size.to_le_bytes());
        dest[14..18].copy_from_slice(&self.format.compression.0);
        dest[18] = self.base_note;
        dest[19] = 0;
        dest[20..24].copy_from_slice(&self.data_len.to_le_bytes());

        Ok(Self::LEN)
    }

    /// Parse a header, returning it along with its length in bytes.
    ///
    /// The declared data length must fit in what follows the header.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), HeaderError> {
        if bytes.len() < Self::LEN {
            return Err(HeaderError::TooShort {
                needed: Self::LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(HeaderError::BadMagic);
        }

        let header_len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        if header_len < Self::LEN || header_len > bytes.len() {
            return Err(HeaderError::TooShort {
                needed: header_len.max(Self::LEN),
                actual: bytes.len(),
            });
        }

        let format = SoundFormat {
            channels: u16::from_le_bytes([bytes[6], bytes[7]]),
            sample_rate: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            sample_size: u16::from_le_bytes([bytes[12], bytes[13]]),
            compression: CompressionType([bytes[14], bytes[15], bytes[16], bytes[17]]),
        };
        let data_len = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);

        let available = bytes.len() - header_len;
        if data_len as usize > available {
            return Err(HeaderError::Truncated {
                declared: data_len as usize,
                available,
            });
        }

        Ok((
            Self {
                format,
                base_note: bytes[18],
                data_len,
            },
            header_len,
        ))
    }
}
