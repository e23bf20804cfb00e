//! Screenshot evidence store
//!
//! Writes captured screenshot bytes to a flat directory and hands back
//! only the generated filename; durable storage guarantees belong to the
//! platform layer that consumes the result.

use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uireplay_common::{Error, Result};

const FILENAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const RANDOM_SUFFIX_LEN: usize = 8;

/// Flat-file store for screenshot evidence.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate the evidence filename for a capture:
    /// `{tag}_{timestamp}_{step_index}_{random}.png`.
    pub fn filename(tag: &str, step_index: usize) -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut rng = rand::thread_rng();
        let suffix: String = (0..RANDOM_SUFFIX_LEN)
            .map(|_| FILENAME_CHARSET[rng.gen_range(0..FILENAME_CHARSET.len())] as char)
            .collect();
        format!("{}_{}_{}_{}.png", tag, timestamp, step_index, suffix)
    }

    /// Persist screenshot bytes, returning the generated filename.
    pub async fn store(&self, tag: &str, step_index: usize, bytes: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Screenshot(format!("create {}: {}", self.dir.display(), e)))?;

        let filename = Self::filename(tag, step_index);
        let path = self.dir.join(&filename);
        fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Screenshot(format!("write {}: {}", path.display(), e)))?;

        debug!("Screenshot saved: {}", path.display());
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_shape() {
        let name = EvidenceStore::filename("error", 4);
        let parts: Vec<&str> = name.trim_end_matches(".png").split('_').collect();
        // tag, date, time, index, random
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "error");
        assert_eq!(parts[3], "4");
        assert_eq!(parts[4].len(), RANDOM_SUFFIX_LEN);
        assert!(parts[4]
            .bytes()
            .all(|b| FILENAME_CHARSET.contains(&b)));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_store_writes_bytes_and_returns_filename_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());

        let filename = store.store("initial", 0, b"fake-png").await.unwrap();
        assert!(!filename.contains('/'));
        let written = std::fs::read(dir.path().join(&filename)).unwrap();
        assert_eq!(written, b"fake-png");
    }

    #[tokio::test]
    async fn test_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("evidence").join("run1");
        let store = EvidenceStore::new(&nested);
        store.store("final", 2, b"x").await.unwrap();
        assert!(nested.exists());
    }
}
