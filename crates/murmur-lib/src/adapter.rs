//! Synthesis adapter — the only path from a request to the engine.
//!
//! ```text
//! raw text → SynthesisText::parse (prepare + validate)
//!     → pending permit (try, else Busy)
//!     → inference lock (one engine call at a time)
//!     → chunk_text → engine.synthesize(chunk)… → concatenated AudioClip
//! ```
//!
//! The backend's thread-safety is unknown, so the lock is held for the whole
//! request, and requests never interleave inside the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use murmur_core::request::{RequestError, SynthesisText};
use murmur_core::text_prep::chunk_text;
use murmur_core::types::SynthesisLimits;
use murmur_core::wav::AudioClip;

use crate::engine::{EngineError, SpeechEngine};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("too many pending synthesis requests")]
    Busy,
    #[error("synthesis timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Cloneable handle shared by every request handler.
#[derive(Clone)]
pub struct SynthesisAdapter {
    engine: Arc<dyn SpeechEngine>,
    inference: Arc<Mutex<()>>,
    pending: Arc<Semaphore>,
    limits: SynthesisLimits,
}

impl SynthesisAdapter {
    pub fn new(engine: Arc<dyn SpeechEngine>, limits: SynthesisLimits) -> Self {
        Self {
            engine,
            inference: Arc::new(Mutex::new(())),
            pending: Arc::new(Semaphore::new(limits.max_pending.max(1))),
            limits,
        }
    }

    /// Validate the decoded `text` query value.
    pub fn validate(&self, raw: Option<&str>) -> Result<SynthesisText, RequestError> {
        SynthesisText::parse(raw, self.limits.max_text_len)
    }

    /// Validate and synthesize in one step.
    pub async fn synthesize(&self, text: &str) -> Result<AudioClip, SynthesisError> {
        let text = self.validate(Some(text))?;
        self.synthesize_text(&text).await
    }

    /// Synthesize validated text. Rejects immediately with
    /// [`SynthesisError::Busy`] when `max_pending` requests are already
    /// waiting or running.
    pub async fn synthesize_text(&self, text: &SynthesisText) -> Result<AudioClip, SynthesisError> {
        let _permit = self
            .pending
            .clone()
            .try_acquire_owned()
            .map_err(|_| SynthesisError::Busy)?;

        let _guard = self.inference.lock().await;
        let t0 = Instant::now();

        let clip = match self.limits.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(text.as_str()))
                .await
                .map_err(|_| SynthesisError::Timeout(limit))??,
            None => self.run(text.as_str()).await?,
        };

        info!(
            "synthesized {} chars into {:.2}s of audio in {:?}",
            text.as_str().chars().count(),
            clip.duration().as_secs_f32(),
            t0.elapsed()
        );
        Ok(clip)
    }

    async fn run(&self, text: &str) -> Result<AudioClip, EngineError> {
        let chunks = chunk_text(text, self.limits.max_chunk_len);
        let mut clip = AudioClip::new(Vec::new(), self.engine.sample_rate());

        for (i, chunk) in chunks.iter().enumerate() {
            debug!("chunk {}/{} ({} bytes)", i + 1, chunks.len(), chunk.len());
            let part = self.engine.synthesize(chunk).await?;
            if part.sample_rate != clip.sample_rate {
                return Err(EngineError::Synthesis(format!(
                    "engine returned {} Hz audio, expected {} Hz",
                    part.sample_rate, clip.sample_rate
                )));
            }
            clip.extend(part);
        }

        if clip.is_empty() {
            return Err(EngineError::EmptyAudio);
        }
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::engine::EngineFuture;

    /// Records every chunk it is asked to speak; one sample per byte.
    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl SpeechEngine for Recorder {
        fn synthesize<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<AudioClip, EngineError>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.calls.lock().unwrap().push(text.to_string());
                Ok(AudioClip::new(vec![1; text.len()], 24_000))
            })
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    fn adapter(engine: Arc<Recorder>, limits: SynthesisLimits) -> SynthesisAdapter {
        SynthesisAdapter::new(engine, limits)
    }

    #[tokio::test]
    async fn blank_text_never_reaches_engine() {
        let engine = Arc::new(Recorder::default());
        let a = adapter(engine.clone(), SynthesisLimits::default());

        let err = a.synthesize("   ").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Request(RequestError::EmptyText)));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_text_is_chunked_in_order() {
        let engine = Arc::new(Recorder::default());
        let limits = SynthesisLimits {
            max_chunk_len: 12,
            ..Default::default()
        };
        let a = adapter(engine.clone(), limits);

        let clip = a.synthesize("First one. Second one. Third.").await.unwrap();
        let calls = engine.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["First one.", "Second one.", "Third."]);
        assert_eq!(clip.samples.len(), calls.iter().map(String::len).sum::<usize>());
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let engine = Arc::new(Recorder {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let limits = SynthesisLimits {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let a = adapter(engine, limits);

        let err = a.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Timeout(_)));
    }

    #[tokio::test]
    async fn excess_requests_are_rejected_as_busy() {
        let engine = Arc::new(Recorder {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let limits = SynthesisLimits {
            max_pending: 1,
            ..Default::default()
        };
        let a = adapter(engine, limits);

        let first = {
            let a = a.clone();
            tokio::spawn(async move { a.synthesize("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = a.synthesize("second").await;
        assert!(matches!(second, Err(SynthesisError::Busy)));
        assert!(first.await.unwrap().is_ok());
    }
}
