//! Model downloader with progress reporting via callback

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use murmur_core::types::{DownloadProgress, DownloadStatus, KOKORO_FILES, ModelInfo};

/// Get the path to a model file under the given models directory
pub fn model_path(models_dir: &Path, model: &ModelInfo) -> PathBuf {
    models_dir.join(model.filename)
}

/// Download a model with progress reporting.
///
/// Interrupted downloads leave a `<filename>.partial` behind which is resumed
/// with a `Range` request on the next call.
pub async fn download_model(
    client: &reqwest::Client,
    models_dir: &Path,
    model: &ModelInfo,
    on_progress: impl Fn(DownloadProgress),
) -> Result<PathBuf, String> {
    tokio::fs::create_dir_all(models_dir)
        .await
        .map_err(|e| format!("failed to create models dir: {e}"))?;

    let dest = model_path(models_dir, model);

    if dest.is_file() {
        on_progress(progress(model, model.expected_size, model.expected_size, DownloadStatus::Complete));
        return Ok(dest);
    }

    let partial = models_dir.join(format!("{}.partial", model.filename));
    let existing_size = match tokio::fs::metadata(&partial).await {
        Ok(m) if m.is_file() => m.len(),
        _ => 0,
    };

    let mut req = client.get(model.url);
    if existing_size > 0 {
        info!("resuming {} download at {existing_size} bytes", model.name);
        req = req.header(reqwest::header::RANGE, format!("bytes={existing_size}-"));
    }

    let resp = req
        .send()
        .await
        .map_err(|e| format!("download request failed: {e}"))?;

    let resumed = resp.status() == reqwest::StatusCode::PARTIAL_CONTENT;
    if !resp.status().is_success() {
        return Err(format!("download of {} failed with status {}", model.name, resp.status()));
    }

    let total_size = if resumed {
        resp.headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range)
            .unwrap_or(model.expected_size)
    } else {
        resp.content_length().unwrap_or(model.expected_size)
    };

    // A server that ignores Range sends the whole file again.
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(resumed)
        .truncate(!resumed)
        .open(&partial)
        .await
        .map_err(|e| format!("failed to open partial file: {e}"))?;

    let mut bytes_done = if resumed { existing_size } else { 0 };
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download stream error: {e}"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write chunk: {e}"))?;

        bytes_done += chunk.len() as u64;
        on_progress(progress(model, bytes_done, total_size, DownloadStatus::Downloading));
    }

    file.flush()
        .await
        .map_err(|e| format!("flush failed: {e}"))?;
    drop(file);

    tokio::fs::rename(&partial, &dest)
        .await
        .map_err(|e| format!("failed to finalize download: {e}"))?;

    on_progress(progress(model, total_size, total_size, DownloadStatus::Complete));

    Ok(dest)
}

/// Ensure the Kokoro model and voice pack are present. Returns
/// `(model, voices)` paths.
pub async fn ensure_kokoro_files(
    client: &reqwest::Client,
    models_dir: &Path,
    on_progress: impl Fn(DownloadProgress),
) -> Result<(PathBuf, PathBuf), String> {
    let [model, voices] = KOKORO_FILES;
    let model = download_model(client, models_dir, model, &on_progress).await?;
    let voices = download_model(client, models_dir, voices, &on_progress).await?;
    Ok((model, voices))
}

/// Progress callback that logs every whole 10% step.
pub fn log_progress() -> impl Fn(DownloadProgress) {
    let last = std::sync::Mutex::new((String::new(), -1i32));
    move |p: DownloadProgress| {
        let step = (p.percent / 10.0) as i32;
        let Ok(mut seen) = last.lock() else { return };
        if seen.0 != p.model || seen.1 != step {
            *seen = (p.model.clone(), step);
            match p.status {
                DownloadStatus::Downloading => {
                    info!("{}: {:.0}% ({}/{} bytes)", p.model, p.percent, p.bytes_done, p.bytes_total)
                }
                DownloadStatus::Complete => info!("{}: ready", p.model),
            }
        }
    }
}

fn progress(model: &ModelInfo, done: u64, total: u64, status: DownloadStatus) -> DownloadProgress {
    let percent = if total == 0 {
        100.0
    } else {
        (done as f32 / total as f32 * 100.0).min(100.0)
    };
    DownloadProgress {
        model: model.name.to_string(),
        percent,
        bytes_done: done,
        bytes_total: total,
        status,
    }
}

/// `bytes 100-199/1000` → `1000`
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}
