//! Shared types for the murmur server.
//!
//! Configuration lives here rather than in murmur-lib so the CLI and tests
//! can build configs without pulling in tokio, axum or reqwest.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::text_prep::DEFAULT_MAX_CHUNK_LEN;

// ─── Server types ──────────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4003;

/// Static body served by the health endpoint.
pub const HEALTH_BODY: &str = "<html><head><p>TTS-server is running.</p></head>";

/// Body encoding used for `/generate` responses. Fixed for the lifetime of
/// the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// 16-bit mono PCM in a RIFF/WAVE container.
    #[default]
    Wav,
    /// Headerless 16-bit signed little-endian mono PCM.
    Pcm,
}

impl AudioFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/x-wav",
            AudioFormat::Pcm => "application/octet-stream",
        }
    }

    /// File extension used when a rendered body is staged on disk.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Wav => f.write_str("wav"),
            AudioFormat::Pcm => f.write_str("pcm"),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "pcm" | "raw" => Ok(AudioFormat::Pcm),
            other => Err(format!("unknown audio format '{other}'; expected wav or pcm")),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub format: AudioFormat,
    /// When set, every rendered WAV is staged as `<dir>/<uuid>.wav` and
    /// removed once the response body has been read back.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            format: AudioFormat::Wav,
            scratch_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ─── Engine types ──────────────────────────────────────────────────────────

/// Kokoro backend configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of an already running Kokoro server. Ignored when
    /// `spawn_sidecar` is set.
    pub kokoro_url: String,
    pub voice: String,
    pub speed: f32,
    /// Download the model files and launch `koko` ourselves.
    pub spawn_sidecar: bool,
    pub sidecar_port: u16,
    pub models_dir: PathBuf,
    /// How long `init()` waits for the backend to answer its health check.
    pub init_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kokoro_url: "http://127.0.0.1:3001".into(),
            voice: "af_heart".into(),
            speed: 1.0,
            spawn_sidecar: false,
            sidecar_port: 3001,
            models_dir: PathBuf::from("models"),
            init_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// URL the engine talks to after init.
    pub fn backend_url(&self) -> String {
        if self.spawn_sidecar {
            format!("http://127.0.0.1:{}", self.sidecar_port)
        } else {
            self.kokoro_url.trim_end_matches('/').to_string()
        }
    }
}

/// Per-request limits enforced by the synthesis adapter.
#[derive(Debug, Clone)]
pub struct SynthesisLimits {
    /// Maximum accepted text length, in characters.
    pub max_text_len: usize,
    /// Longer text is split and synthesized chunk by chunk.
    pub max_chunk_len: usize,
    /// Requests allowed to wait for (or hold) the engine at once.
    pub max_pending: usize,
    pub timeout: Option<Duration>,
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        Self {
            max_text_len: 5000,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            max_pending: 8,
            timeout: None,
        }
    }
}

// ─── Download types ────────────────────────────────────────────────────────

/// Model file definition.
pub struct ModelInfo {
    pub name: &'static str,
    pub filename: &'static str,
    pub url: &'static str,
    pub expected_size: u64,
}

pub const KOKORO_MODEL: ModelInfo = ModelInfo {
    name: "kokoro",
    filename: "kokoro-v1.0.onnx",
    url: "https://github.com/thewh1teagle/kokoro-onnx/releases/download/model-files-v1.0/kokoro-v1.0.onnx",
    expected_size: 326_000_000,
};

pub const KOKORO_VOICES: ModelInfo = ModelInfo {
    name: "kokoro-voices",
    filename: "voices-v1.0.bin",
    url: "https://github.com/thewh1teagle/kokoro-onnx/releases/download/model-files-v1.0/voices-v1.0.bin",
    expected_size: 5_200_000,
};

/// Every file the Kokoro sidecar needs.
pub const KOKORO_FILES: [&ModelInfo; 2] = [&KOKORO_MODEL, &KOKORO_VOICES];

/// Download lifecycle reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloading,
    Complete,
}

/// Download progress payload.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub model: String,
    pub percent: f32,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub status: DownloadStatus,
}
