//! Per-request scratch files.
//!
//! Rendered audio can be staged on disk as `<dir>/<uuid>.<ext>` before it
//! is served. Each file is owned by a [`ScratchFile`] guard and removed when
//! the guard drops, on success and error paths alike.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("scratch I/O on {}: {source}", .path.display())]
pub struct ScratchError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl ScratchError {
    fn new(path: &Path, source: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Create the directory if needed and purge files left by a previous
    /// run. Only `<uuid>.wav` and `<uuid>.pcm` names are touched.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ScratchError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ScratchError::new(&root, e))?;

        let mut entries = tokio::fs::read_dir(&root)
            .await
            .map_err(|e| ScratchError::new(&root, e))?;
        let mut purged = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScratchError::new(&root, e))?
        {
            let path = entry.path();
            if is_scratch_name(&path) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => purged += 1,
                    Err(e) => warn!("could not purge {}: {e}", path.display()),
                }
            }
        }
        if purged > 0 {
            info!("purged {purged} stale scratch file(s) from {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to a fresh uniquely named `<uuid>.<ext>` file.
    pub async fn stage(&self, bytes: &[u8], ext: &str) -> Result<ScratchFile, ScratchError> {
        let path = self.root.join(format!("{}.{ext}", Uuid::new_v4()));
        // Guard first so a partial write is still cleaned up.
        let file = ScratchFile { path };
        tokio::fs::write(&file.path, bytes)
            .await
            .map_err(|e| ScratchError::new(&file.path, e))?;
        debug!("staged {} bytes at {}", bytes.len(), file.path.display());
        Ok(file)
    }
}

/// Names [`ScratchDir::stage`] could have produced.
fn is_scratch_name(path: &Path) -> bool {
    let ext_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "wav" | "pcm"));
    ext_ok
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| Uuid::parse_str(stem).is_ok())
}

/// A staged file, deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>, ScratchError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ScratchError::new(&self.path, e))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("murmur-scratch-{name}-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let dir = ScratchDir::open(temp_root("drop")).await.unwrap();
        let file = dir.stage(b"RIFF....", "wav").await.unwrap();
        let path = file.path().to_path_buf();

        assert!(path.is_file());
        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(file.read().await.unwrap(), b"RIFF....");

        drop(file);
        assert!(!path.exists());
        std::fs::remove_dir_all(dir.root()).unwrap();
    }

    #[tokio::test]
    async fn names_are_unique() {
        let dir = ScratchDir::open(temp_root("unique")).await.unwrap();
        let a = dir.stage(b"a", "wav").await.unwrap();
        let b = dir.stage(b"b", "pcm").await.unwrap();
        assert_ne!(a.path(), b.path());
        drop((a, b));
        std::fs::remove_dir_all(dir.root()).unwrap();
    }

    #[tokio::test]
    async fn open_purges_only_stale_scratch_files() {
        let root = temp_root("purge");
        std::fs::create_dir_all(&root).unwrap();
        let stale_wav = format!("{}.wav", Uuid::new_v4());
        let stale_pcm = format!("{}.pcm", Uuid::new_v4());
        for name in [&stale_wav, &stale_pcm] {
            std::fs::write(root.join(name), b"x").unwrap();
        }
        std::fs::write(root.join("my_recording.wav"), b"x").unwrap();
        std::fs::write(root.join("keep.txt"), b"x").unwrap();

        let dir = ScratchDir::open(&root).await.unwrap();
        assert!(!root.join(&stale_wav).exists());
        assert!(!root.join(&stale_pcm).exists());
        assert!(root.join("my_recording.wav").exists());
        assert!(root.join("keep.txt").exists());
        std::fs::remove_dir_all(dir.root()).unwrap();
    }
}
