#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use murmur_lib::engine::{EngineError, EngineFuture, SpeechEngine};
use murmur_lib::murmur_core::wav::AudioClip;

pub const RATE: u32 = 24_000;

/// Sine generator standing in for a real model: 10 ms of 440 Hz per
/// character. Tracks how many calls overlap.
#[derive(Default)]
pub struct ToneEngine {
    pub delay: Option<Duration>,
    pub fail: bool,
    pub spoken: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl ToneEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechEngine for ToneEngine {
    fn synthesize<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<AudioClip, EngineError>> {
        Box::pin(async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(EngineError::Synthesis("model exploded".into()));
            }
            self.spoken.lock().unwrap().push(text.to_string());

            let n = text.chars().count() * (RATE as usize / 100);
            let samples = (0..n)
                .map(|i| {
                    let t = i as f32 / RATE as f32;
                    ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16
                })
                .collect();
            Ok(AudioClip::new(samples, RATE))
        })
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }
}
