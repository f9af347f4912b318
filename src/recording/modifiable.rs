//! Per-session overrides layered over a `RecordSession`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::matching::Matcher;
use crate::transform::RegisteredTransform;

use super::session::RecordSession;

/// Overrides one live session carries on top of the global registries
#[derive(Debug, Default, Clone)]
pub struct SessionExtensions {
    /// Replaces the global matcher for this session
    pub custom_matcher: Option<Arc<dyn Matcher>>,
    /// Applied after the global transforms
    pub additional_transforms: Vec<RegisteredTransform>,
    /// Sanitizer ids added to this session explicitly
    pub applied_sanitizers: Vec<String>,
    /// Sanitizer ids removed from this session; wins over everything else
    pub for_removal: HashSet<String>,
    /// Delay injected before each playback response
    pub playback_latency: Duration,
}

/// A live recording or playback session owned by the `RecordingStore`
#[derive(Debug)]
pub struct ModifiableRecordSession {
    session: RecordSession,
    path: Option<PathBuf>,
    source_recording_id: Option<String>,
    extensions: RwLock<SessionExtensions>,
}

impl ModifiableRecordSession {
    /// Wrap a session
    #[must_use]
    pub fn new(
        session: RecordSession,
        path: Option<PathBuf>,
        source_recording_id: Option<String>,
    ) -> Self {
        Self {
            session,
            path,
            source_recording_id,
            extensions: RwLock::new(SessionExtensions::default()),
        }
    }

    /// The wrapped entry pool
    #[must_use]
    pub fn session(&self) -> &RecordSession {
        &self.session
    }

    /// Recording file, if the session is file-backed
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Recording id this playback was built from, for in-memory recordings
    #[must_use]
    pub fn source_recording_id(&self) -> Option<&str> {
        self.source_recording_id.as_deref()
    }

    /// Snapshot of the current overrides
    #[must_use]
    pub fn extensions(&self) -> SessionExtensions {
        self.extensions.read().clone()
    }

    /// The session's matcher override, if any
    #[must_use]
    pub fn custom_matcher(&self) -> Option<Arc<dyn Matcher>> {
        self.extensions.read().custom_matcher.clone()
    }

    /// Transforms registered for this session only
    #[must_use]
    pub fn additional_transforms(&self) -> Vec<RegisteredTransform> {
        self.extensions.read().additional_transforms.clone()
    }

    /// Configured playback delay
    #[must_use]
    pub fn playback_latency(&self) -> Duration {
        self.extensions.read().playback_latency
    }

    /// Sanitizer ids in effect: global defaults then explicit additions,
    /// deduplicated, minus anything removed from this session.
    #[must_use]
    pub fn active_sanitizer_ids(&self, defaults: &[String]) -> Vec<String> {
        let extensions = self.extensions.read();
        let mut seen = HashSet::new();
        defaults
            .iter()
            .chain(extensions.applied_sanitizers.iter())
            .filter(|id| !extensions.for_removal.contains(*id))
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    pub(crate) fn set_matcher(&self, matcher: Arc<dyn Matcher>) {
        self.extensions.write().custom_matcher = Some(matcher);
    }

    pub(crate) fn add_transform(&self, transform: RegisteredTransform) {
        self.extensions.write().additional_transforms.push(transform);
    }

    pub(crate) fn add_sanitizer_id(&self, id: String) {
        let mut extensions = self.extensions.write();
        if !extensions.applied_sanitizers.contains(&id) {
            extensions.applied_sanitizers.push(id);
        }
    }

    /// Returns the ids that were not already removed
    pub(crate) fn remove_sanitizer_ids(&self, ids: &[String]) -> Vec<String> {
        let mut extensions = self.extensions.write();
        ids.iter()
            .filter(|id| extensions.for_removal.insert((*id).clone()))
            .cloned()
            .collect()
    }

    pub(crate) fn set_playback_latency(&self, latency: Duration) {
        self.extensions.write().playback_latency = latency;
    }

    pub(crate) fn reset(&self) {
        *self.extensions.write() = SessionExtensions::default();
    }
}
