//! Kokoro sidecar lifecycle — spawn `koko`, forward its stderr, wait for health, kill on shutdown.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const KOKORO_SIDECAR: &str = "koko";

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A running `koko` process serving the OpenAI-compatible API on loopback.
pub struct KokoroSidecar {
    child: Mutex<Option<Child>>,
}

impl KokoroSidecar {
    /// Spawn `koko --model <m> --data <v> openai --ip 127.0.0.1 --port <p>`.
    ///
    /// The process is killed when the returned value is dropped.
    pub fn spawn(model_path: &Path, voices_path: &Path, port: u16) -> Result<Self, String> {
        let binary = resolve_sidecar(KOKORO_SIDECAR)?;
        info!("starting {} on port {port}", binary.display());

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.arg("--model")
            .arg(model_path)
            .arg("--data")
            .arg(voices_path)
            .args(["openai", "--ip", "127.0.0.1", "--port", &port.to_string()]);
        Self::launch(cmd).map_err(|e| format!("failed to spawn {}: {e}", binary.display()))
    }

    /// Start `cmd` with stderr forwarded to the log.
    pub(crate) fn launch(mut cmd: tokio::process::Command) -> std::io::Result<Self> {
        let mut child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                use tokio::io::{AsyncBufReadExt, BufReader};
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[koko] {line}");
                }
            });
        }

        Ok(Self {
            child: Mutex::new(Some(child)),
        })
    }

    /// Resolves once the process exits, describing how it ended.
    ///
    /// Holds the process lock while waiting; drop the future before calling
    /// [`stop`](Self::stop).
    pub async fn exited(&self) -> String {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return "already stopped".to_string();
        };
        match child.wait().await {
            Ok(status) => {
                *guard = None;
                status.to_string()
            }
            Err(e) => format!("wait failed: {e}"),
        }
    }

    pub async fn stop(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to kill koko: {e}");
            } else {
                info!("koko stopped");
            }
        }
    }
}

/// Poll `url` until it answers or `timeout` elapses.
pub async fn wait_for_health(
    client: &reqwest::Client,
    url: &str,
    name: &str,
    timeout: Duration,
) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match client.get(url).timeout(HEALTH_POLL_INTERVAL * 4).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(format!(
                        "{name} did not become ready within {}s: {e}",
                        timeout.as_secs()
                    ));
                }
                tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

/// Look next to our own executable first, then fall back to `PATH`.
fn resolve_sidecar(name: &str) -> Result<PathBuf, String> {
    let exe = std::env::current_exe()
        .map_err(|e| format!("cannot determine executable path: {e}"))?;
    let exe_dir = exe
        .parent()
        .ok_or_else(|| "executable has no parent directory".to_string())?;

    let bundled = exe_dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
    if bundled.is_file() {
        return Ok(bundled);
    }

    Ok(PathBuf::from(name))
}
