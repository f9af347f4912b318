//! Session registry: recording id to live session

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::recording::{ModifiableRecordSession, RecordSession, Variables};
use crate::sanitize::RegisteredSanitizer;
use crate::storage::{resolve_path, Recording, RecordingCache, RecordingWriter};
use crate::{RecplayError, Result};

/// Where a playback session's entries come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    /// A recording file, relative to the storage root or absolute
    File(String),
    /// An in-memory recording kept from an earlier recording session
    RecordingId(String),
}

/// What to do with a recording when it stops
#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Variables stored with the recording
    pub variables: Variables,
    /// Persist the recording; `false` discards it
    pub save: bool,
    /// Sanitizers run over the whole session before it is persisted
    pub sanitizers: Vec<RegisteredSanitizer>,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            variables: Variables::new(),
            save: true,
            sanitizers: Vec::new(),
        }
    }
}

/// Stopped ids remembered for `DuplicateSessionStop`; older ones report
/// `UnknownRecordingId` instead
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 4096;

// A stopped id keeps a tombstone so a second stop can be told apart from
// an id that never existed. Tombstones are evicted oldest first once more
// than the store's capacity exist.
#[derive(Debug, Clone)]
enum SessionSlot {
    Active(Arc<ModifiableRecordSession>),
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum SessionKind {
    Recording,
    Playback,
}

/// Process-wide registry of recording and playback sessions.
///
/// Recording and playback ids live in separate maps over one id space.
/// Start and stop each take a single shard lock, so they are linearizable
/// per id; pool access inside a session is guarded by the session itself.
#[derive(Debug)]
pub struct RecordingStore {
    storage_root: PathBuf,
    recordings: DashMap<String, SessionSlot>,
    playbacks: DashMap<String, SessionSlot>,
    in_memory: DashMap<String, Arc<Recording>>,
    file_cache: RecordingCache,
    // Stop order of tombstoned ids
    retired: Mutex<VecDeque<(SessionKind, String)>>,
    tombstone_capacity: usize,
}

impl RecordingStore {
    /// Create a store rooted at `storage_root`
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            recordings: DashMap::new(),
            playbacks: DashMap::new(),
            in_memory: DashMap::new(),
            file_cache: RecordingCache::new(),
            retired: Mutex::new(VecDeque::new()),
            tombstone_capacity: DEFAULT_TOMBSTONE_CAPACITY,
        }
    }

    /// Keep at most `capacity` stopped-id tombstones
    #[must_use]
    pub fn with_tombstone_capacity(mut self, capacity: usize) -> Self {
        self.tombstone_capacity = capacity;
        self
    }

    /// Root that relative recording paths resolve against
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Start a recording session.
    ///
    /// With a file the session is persisted there on stop; without one it
    /// is kept in memory under its recording id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the file path is empty or escapes the root.
    pub fn start_recording(&self, file: Option<&str>) -> Result<String> {
        let path = file
            .map(|file| resolve_path(&self.storage_root, file))
            .transpose()?;
        let id = Uuid::new_v4().to_string();
        info!(
            recording_id = %id,
            file = %path.as_deref().map_or_else(|| "<in-memory>".into(), |p| p.display().to_string()),
            "recording started"
        );
        let session = ModifiableRecordSession::new(RecordSession::new(), path, None);
        self.recordings
            .insert(id.clone(), SessionSlot::Active(Arc::new(session)));
        Ok(id)
    }

    /// Start a playback session and return its fresh id and the
    /// recording's variables.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` or `InvalidFormat` for bad files, and
    /// `UnknownRecordingId` for an unknown in-memory recording.
    pub fn start_playback(&self, source: PlaybackSource) -> Result<(String, Variables)> {
        let (recording, path, source_id) = match source {
            PlaybackSource::File(file) => {
                let path = resolve_path(&self.storage_root, &file)?;
                (self.file_cache.load(&path)?, Some(path), None)
            }
            PlaybackSource::RecordingId(recording_id) => {
                let recording = self
                    .in_memory
                    .get(&recording_id)
                    .map(|recording| Arc::clone(&recording))
                    .ok_or_else(|| RecplayError::UnknownRecordingId(recording_id.clone()))?;
                (recording, None, Some(recording_id))
            }
        };

        let session =
            RecordSession::from_parts(recording.entries.clone(), recording.variables.clone());
        session.normalize_request_bodies();
        let variables = recording.variables.clone();

        let id = Uuid::new_v4().to_string();
        info!(
            recording_id = %id,
            entries = recording.entries.len(),
            source = %path.as_deref().map_or_else(
                || source_id.clone().unwrap_or_default(),
                |p| p.display().to_string()
            ),
            "playback started"
        );
        let session = ModifiableRecordSession::new(session, path, source_id);
        self.playbacks
            .insert(id.clone(), SessionSlot::Active(Arc::new(session)));
        Ok((id, variables))
    }

    /// Stop a recording session and persist it.
    ///
    /// The id is retired before anything is written, so a concurrent second
    /// stop sees `DuplicateSessionStop`. If persisting fails the session is
    /// put back and can be stopped again.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId`, `DuplicateSessionStop`, or the write error.
    pub fn stop_recording(&self, id: &str, options: StopOptions) -> Result<()> {
        let session = take_active(&self.recordings, id)?;
        self.retire(SessionKind::Recording, id);

        let inner = session.session();
        inner.set_variables(options.variables);

        if !options.save {
            info!(recording_id = %id, "recording discarded");
            return Ok(());
        }

        inner.sanitize(&options.sanitizers);
        let recording = Recording::new(inner.entries(), inner.variables());

        match session.path() {
            Some(path) => {
                if let Err(e) = RecordingWriter::new(path).write(&recording) {
                    warn!(recording_id = %id, error = %e, "failed to persist recording");
                    self.retired.lock().retain(|(kind, retired)| {
                        !(matches!(kind, SessionKind::Recording) && retired == id)
                    });
                    self.recordings
                        .insert(id.to_string(), SessionSlot::Active(Arc::clone(&session)));
                    return Err(e);
                }
                self.file_cache.invalidate(path);
                info!(
                    recording_id = %id,
                    path = %path.display(),
                    entries = recording.entries.len(),
                    "recording saved"
                );
            }
            None => {
                info!(
                    recording_id = %id,
                    entries = recording.entries.len(),
                    "recording kept in memory"
                );
                self.in_memory.insert(id.to_string(), Arc::new(recording));
            }
        }
        Ok(())
    }

    /// Stop a playback session.
    ///
    /// With `purge`, the cached copy of the source recording is dropped: the
    /// file cache entry for file playbacks, or the in-memory recording itself.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` or `DuplicateSessionStop`.
    pub fn stop_playback(&self, id: &str, purge: bool) -> Result<()> {
        let session = take_active(&self.playbacks, id)?;
        self.retire(SessionKind::Playback, id);
        if purge {
            if let Some(source) = session.source_recording_id() {
                self.in_memory.remove(source);
            }
            if let Some(path) = session.path() {
                self.file_cache.invalidate(path);
            }
        }
        info!(recording_id = %id, purge, "playback stopped");
        Ok(())
    }

    /// Live recording session for `id`
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` if no recording with that id is active.
    pub fn get_recording(&self, id: &str) -> Result<Arc<ModifiableRecordSession>> {
        get_active(&self.recordings, id)
    }

    /// Live playback session for `id`
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` if no playback with that id is active.
    pub fn get_playback(&self, id: &str) -> Result<Arc<ModifiableRecordSession>> {
        get_active(&self.playbacks, id)
    }

    /// Live session for `id` in either mode
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` if the id is active in neither mode.
    pub fn get(&self, id: &str) -> Result<Arc<ModifiableRecordSession>> {
        self.get_recording(id).or_else(|_| self.get_playback(id))
    }

    /// Every live session, for registry-wide resets
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Arc<ModifiableRecordSession>> {
        self.recordings
            .iter()
            .chain(self.playbacks.iter())
            .filter_map(|slot| match slot.value() {
                SessionSlot::Active(session) => Some(Arc::clone(session)),
                SessionSlot::Stopped => None,
            })
            .collect()
    }

    /// Number of live recording sessions
    #[must_use]
    pub fn active_recordings(&self) -> usize {
        count_active(&self.recordings)
    }

    /// Number of live playback sessions
    #[must_use]
    pub fn active_playbacks(&self) -> usize {
        count_active(&self.playbacks)
    }

    /// Number of in-memory recordings available for playback
    #[must_use]
    pub fn in_memory_recordings(&self) -> usize {
        self.in_memory.len()
    }

    /// The file cache
    #[must_use]
    pub fn file_cache(&self) -> &RecordingCache {
        &self.file_cache
    }

    /// Number of stopped ids still remembered
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.retired.lock().len()
    }

    fn slots(&self, kind: SessionKind) -> &DashMap<String, SessionSlot> {
        match kind {
            SessionKind::Recording => &self.recordings,
            SessionKind::Playback => &self.playbacks,
        }
    }

    // Only tombstones are evicted; a slot put back after a failed persist
    // stays.
    fn retire(&self, kind: SessionKind, id: &str) {
        let mut retired = self.retired.lock();
        retired.push_back((kind, id.to_string()));
        while retired.len() > self.tombstone_capacity {
            let Some((kind, oldest)) = retired.pop_front() else {
                break;
            };
            self.slots(kind)
                .remove_if(&oldest, |_, slot| matches!(slot, SessionSlot::Stopped));
        }
    }
}

fn take_active(
    slots: &DashMap<String, SessionSlot>,
    id: &str,
) -> Result<Arc<ModifiableRecordSession>> {
    let mut slot = slots
        .get_mut(id)
        .ok_or_else(|| RecplayError::UnknownRecordingId(id.to_string()))?;
    match std::mem::replace(slot.value_mut(), SessionSlot::Stopped) {
        SessionSlot::Active(session) => Ok(session),
        SessionSlot::Stopped => Err(RecplayError::DuplicateSessionStop(id.to_string())),
    }
}

fn get_active(
    slots: &DashMap<String, SessionSlot>,
    id: &str,
) -> Result<Arc<ModifiableRecordSession>> {
    match slots.get(id).as_deref() {
        Some(SessionSlot::Active(session)) => Ok(Arc::clone(session)),
        _ => Err(RecplayError::UnknownRecordingId(id.to_string())),
    }
}

fn count_active(slots: &DashMap<String, SessionSlot>) -> usize {
    slots
        .iter()
        .filter(|slot| matches!(slot.value(), SessionSlot::Active(_)))
        .count()
}
