//! Process-wide cache of parsed recording files

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::format::Recording;
use super::reader::RecordingReader;
use crate::Result;

/// Parsed recordings keyed by file path.
///
/// Each playback takes its own copy of the cached entries, so consuming
/// entries in one playback never affects another.
#[derive(Debug, Default)]
pub struct RecordingCache {
    recordings: DashMap<PathBuf, Arc<Recording>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl RecordingCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached recording for `path`, reading it on first use
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(&self, path: &Path) -> Result<Arc<Recording>> {
        if let Some(recording) = self.recordings.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "recording cache hit");
            return Ok(Arc::clone(&recording));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let recording = Arc::new(RecordingReader::open(path)?.into_recording());
        info!(
            path = %path.display(),
            entries = recording.entries.len(),
            "loaded recording"
        );
        let cached = self
            .recordings
            .entry(path.to_path_buf())
            .or_insert(recording);
        Ok(Arc::clone(&cached))
    }

    /// Drop the cached copy of `path`; returns true if one was cached
    pub fn invalidate(&self, path: &Path) -> bool {
        self.recordings.remove(path).is_some()
    }

    /// Cache hit count
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache miss count
    #[must_use]
    pub fn miss_count(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached recordings
    #[must_use]
    pub fn size(&self) -> usize {
        self.recordings.len()
    }

    /// Clear the cache and its counters
    pub fn clear(&self) {
        self.recordings.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
