//! Audio clips and WAV encoding.
//!
//! Pure functions — no I/O, no async runtime.

use std::time::Duration;

use thiserror::Error;

/// Output sample rate of the Kokoro backend (mono, 16-bit).
pub const KOKORO_SAMPLE_RATE: u32 = 24_000;

/// Synthesized audio: mono 16-bit samples at a fixed rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Append another clip recorded at the same rate.
    pub fn extend(&mut self, other: AudioClip) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        self.samples.extend(other.samples);
    }

    pub fn to_wav(&self) -> Vec<u8> {
        write_wav(&self.samples, self.sample_rate)
    }

    /// Raw little-endian PCM, no header.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        buf
    }
}

/// Write a minimal WAV file (16-bit mono PCM) from raw samples.
pub fn write_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let file_len = 36 + data_len;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_len.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    #[error("too short for RIFF header")]
    TooShort,
    #[error("missing {0} tag")]
    MissingTag(&'static str),
    #[error("fmt chunk truncated")]
    TruncatedFmt,
    #[error("not PCM format")]
    NotPcm,
    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),
    #[error("data chunk before fmt chunk")]
    DataBeforeFmt,
    #[error("data chunk not found")]
    NoData,
}

/// Parsed WAV header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset in the buffer where raw PCM data begins.
    pub data_offset: usize,
    /// Declared size of the data chunk.
    pub data_len: usize,
}

/// Parse a RIFF/WAVE header and locate the `data` chunk.
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader, WavError> {
    if buf.len() < 12 {
        return Err(WavError::TooShort);
    }
    if &buf[0..4] != b"RIFF" {
        return Err(WavError::MissingTag("RIFF"));
    }
    if &buf[8..12] != b"WAVE" {
        return Err(WavError::MissingTag("WAVE"));
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;

    while pos + 8 <= buf.len() {
        let chunk_id = &buf[pos..pos + 4];
        let chunk_size = read_u32(buf, pos + 4) as usize;

        if chunk_id == b"fmt " {
            if pos + 24 > buf.len() {
                return Err(WavError::TruncatedFmt);
            }
            if read_u16(buf, pos + 8) != 1 {
                return Err(WavError::NotPcm);
            }
            fmt = Some((
                read_u16(buf, pos + 10),
                read_u32(buf, pos + 12),
                read_u16(buf, pos + 22),
            ));
        } else if chunk_id == b"data" {
            let (channels, sample_rate, bits_per_sample) = fmt.ok_or(WavError::DataBeforeFmt)?;
            let data_offset = pos + 8;
            return Ok(WavHeader {
                channels,
                sample_rate,
                bits_per_sample,
                data_offset,
                data_len: chunk_size.min(buf.len() - data_offset),
            });
        }

        // Chunks are word-aligned.
        pos = pos
            .checked_add(8 + (chunk_size & 1))
            .and_then(|p| p.checked_add(chunk_size))
            .ok_or(WavError::NoData)?;
    }

    Err(WavError::NoData)
}

/// Decode a 16-bit PCM WAV buffer into a clip. Multi-channel input keeps
/// only the first channel.
pub fn read_wav(buf: &[u8]) -> Result<AudioClip, WavError> {
    let header = parse_wav_header(buf)?;
    if header.bits_per_sample != 16 {
        return Err(WavError::UnsupportedBitDepth(header.bits_per_sample));
    }

    let data = &buf[header.data_offset..header.data_offset + header.data_len];
    let frame = 2 * header.channels.max(1) as usize;
    let samples = data
        .chunks_exact(frame)
        .map(|f| i16::from_le_bytes([f[0], f[1]]))
        .collect();

    Ok(AudioClip::new(samples, header.sample_rate))
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
