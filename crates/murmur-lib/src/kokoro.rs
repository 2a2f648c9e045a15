//! Kokoro backend — OpenAI-style `/v1/audio/speech` with streamed raw PCM.
//!
//! ```text
//! init(config) → [download model + voices → spawn koko]? → wait for health
//! synthesize("text") → POST /v1/audio/speech {response_format: "pcm", stream: true}
//!     → byte stream → i16 LE samples (odd bytes carried across chunks) → AudioClip
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, info};

use murmur_core::types::EngineConfig;
use murmur_core::wav::{AudioClip, KOKORO_SAMPLE_RATE};

use crate::download;
use crate::engine::{EngineError, EngineFuture, SpeechEngine};
use crate::sidecar::{self, KokoroSidecar};

/// An initialised Kokoro client. Holds the sidecar, if we launched one, for
/// as long as the engine lives.
pub struct KokoroEngine {
    client: reqwest::Client,
    speech_url: String,
    voice: String,
    speed: f32,
    sidecar: Option<KokoroSidecar>,
}

impl KokoroEngine {
    /// One-time provisioning. Any error here is fatal for the server.
    pub async fn init(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::new();
        let base_url = config.backend_url();

        let sidecar = if config.spawn_sidecar {
            info!("provisioning Kokoro files in {}", config.models_dir.display());
            let (model, voices) =
                download::ensure_kokoro_files(&client, &config.models_dir, download::log_progress())
                    .await
                    .map_err(EngineError::Provision)?;
            let sidecar = KokoroSidecar::spawn(&model, &voices, config.sidecar_port)
                .map_err(EngineError::Provision)?;
            Some(sidecar)
        } else {
            None
        };

        info!("waiting for Kokoro at {base_url}");
        await_ready(&client, &base_url, sidecar.as_ref(), config.init_timeout).await?;
        info!("Kokoro ready (voice {}, speed {})", config.voice, config.speed);

        Ok(Self {
            client,
            speech_url: format!("{base_url}/v1/audio/speech"),
            voice: config.voice.clone(),
            speed: config.speed,
            sidecar,
        })
    }

    /// Stop the sidecar, if any. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(sidecar) = &self.sidecar {
            sidecar.stop().await;
        }
    }

    async fn fetch(&self, text: &str) -> Result<AudioClip, EngineError> {
        let body = serde_json::json!({
            "input": text,
            "voice": self.voice,
            "model": "kokoro",
            "response_format": "pcm",
            "stream": true,
            "speed": self.speed,
        });

        debug!("kokoro: POST {} chars", text.len());

        let resp = self
            .client
            .post(&self.speech_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Synthesis(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(EngineError::Synthesis(format!("Kokoro error {status}: {detail}")));
        }

        let mut stream = resp.bytes_stream();
        let mut samples = Vec::new();
        let mut leftover: Option<u8> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::Synthesis(format!("stream error: {e}")))?;
            let (decoded, lo) = bytes_to_i16(&chunk, leftover.take());
            samples.extend(decoded);
            leftover = lo;
        }

        if samples.is_empty() {
            return Err(EngineError::EmptyAudio);
        }

        debug!("kokoro: received {} samples", samples.len());
        Ok(AudioClip::new(samples, KOKORO_SAMPLE_RATE))
    }
}

impl SpeechEngine for KokoroEngine {
    fn synthesize<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<AudioClip, EngineError>> {
        Box::pin(self.fetch(text))
    }

    fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }
}

/// Wait for the backend to answer. A launched sidecar that exits first fails
/// fast with its exit status instead of running out the timeout.
async fn await_ready(
    client: &reqwest::Client,
    base_url: &str,
    sidecar: Option<&KokoroSidecar>,
    timeout: Duration,
) -> Result<(), EngineError> {
    let health_url = format!("{base_url}/");
    let ready = sidecar::wait_for_health(client, &health_url, "kokoro", timeout);

    let Some(sidecar) = sidecar else {
        return ready.await.map_err(EngineError::Unavailable);
    };
    tokio::select! {
        result = ready => result.map_err(EngineError::Unavailable),
        status = sidecar.exited() => {
            Err(EngineError::Provision(format!("koko exited during startup: {status}")))
        }
    }
}

/// Convert raw bytes to i16 PCM samples (little-endian), carrying a dangling
/// odd byte over to the next chunk.
fn bytes_to_i16(bytes: &[u8], leftover: Option<u8>) -> (Vec<i16>, Option<u8>) {
    let mut data: Vec<u8>;
    let slice = if let Some(lo) = leftover {
        data = Vec::with_capacity(1 + bytes.len());
        data.push(lo);
        data.extend_from_slice(bytes);
        &data[..]
    } else {
        bytes
    };

    let samples = slice
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let remainder = if slice.len() % 2 == 1 {
        Some(slice[slice.len() - 1])
    } else {
        None
    };

    (samples, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn sidecar_exit_fails_init_fast() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "exit 7"]);
        let sidecar = KokoroSidecar::launch(cmd).unwrap();

        let started = std::time::Instant::now();
        let err = await_ready(
            &reqwest::Client::new(),
            &format!("http://127.0.0.1:{port}"),
            Some(&sidecar),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            EngineError::Provision(msg) => assert!(msg.contains('7'), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bytes_to_i16_basic() {
        let (samples, lo) = bytes_to_i16(&[0x01, 0x00, 0xFF, 0x7F], None);
        assert_eq!(samples, vec![1, 32767]);
        assert_eq!(lo, None);
    }

    #[test]
    fn bytes_to_i16_with_leftover() {
        let (samples, lo) = bytes_to_i16(&[0x01, 0x00, 0xFF], None);
        assert_eq!(samples, vec![1]);
        assert_eq!(lo, Some(0xFF));
    }

    #[test]
    fn bytes_to_i16_carry_leftover() {
        let (samples, lo) = bytes_to_i16(&[0x7F, 0x01, 0x00], Some(0xFF));
        assert_eq!(samples, vec![32767, 1]);
        assert_eq!(lo, None);
    }

    #[test]
    fn bytes_to_i16_single_byte() {
        let (samples, lo) = bytes_to_i16(&[0x42], None);
        assert!(samples.is_empty());
        assert_eq!(lo, Some(0x42));
    }
}
