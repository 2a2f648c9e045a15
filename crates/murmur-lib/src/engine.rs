//! The speech engine seam.
//!
//! An engine is constructed fully initialised (see [`crate::kokoro::KokoroEngine::init`])
//! so there is no way to call [`SpeechEngine::synthesize`] on a half-built one.
//! Thread-safety of the backend is not assumed: callers go through
//! [`crate::adapter::SynthesisAdapter`], which never overlaps two calls.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use murmur_core::wav::AudioClip;

pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// One-time setup (downloads, sidecar launch) failed.
    #[error("provisioning failed: {0}")]
    Provision(String),
    /// The backend never answered its health check.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("engine produced no audio")]
    EmptyAudio,
}

/// A text-to-speech backend: text in, mono 16-bit samples out.
pub trait SpeechEngine: Send + Sync + 'static {
    /// Run one inference. No retries are attempted by callers.
    fn synthesize<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<AudioClip, EngineError>>;

    /// Rate of every clip this engine produces.
    fn sample_rate(&self) -> u32;
}
