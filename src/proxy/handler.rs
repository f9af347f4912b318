//! Entry point tying the session store to the registries and the upstream

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::matching::{matcher_from_config, Matcher, RecordMatcher};
use crate::network::{HttpClient, Upstream};
use crate::recording::{ModifiableRecordSession, Variables};
use crate::sanitize::{sanitizer_from_config, RegisteredSanitizer, SanitizerRegistry};
use crate::store::{PlaybackSource, RecordingStore, StopOptions};
use crate::transform::{transform_from_config, RegisteredTransform, TransformRegistry};
use crate::{RecplayError, Result};

use super::save_on_stop;

/// Record/playback orchestrator.
///
/// Owns the session store, the sanitizer, transform and matcher registries,
/// and the upstream client. One instance serves the whole process.
pub struct RecordingHandler {
    pub(super) config: Arc<Config>,
    pub(super) store: RecordingStore,
    pub(super) upstream: Arc<dyn Upstream>,
    pub(super) sanitizers: SanitizerRegistry,
    pub(super) transforms: TransformRegistry,
    matcher: RwLock<Arc<dyn Matcher>>,
}

impl std::fmt::Debug for RecordingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandler")
            .field("storage_location", &self.config.storage_location)
            .field("store", &self.store)
            .field("matcher", &self.matcher.read().name())
            .finish_non_exhaustive()
    }
}

impl RecordingHandler {
    /// Create a handler that forwards record-mode traffic over the network
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let upstream = Arc::new(HttpClient::new(&config.upstream, &config.limits));
        Self::with_upstream(config, upstream)
    }

    /// Create a handler over a custom upstream
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_upstream(config: Config, upstream: Arc<dyn Upstream>) -> Result<Self> {
        config.validate()?;
        let sanitizers = SanitizerRegistry::new(config.default_sanitizers)?;
        let matcher: Arc<dyn Matcher> = Arc::new(RecordMatcher::new(config.matching.clone()));
        info!(
            storage_location = %config.storage_location.display(),
            default_sanitizers = config.default_sanitizers,
            "recording handler ready"
        );
        Ok(Self {
            store: RecordingStore::new(config.storage_location.clone()),
            config: Arc::new(config),
            upstream,
            sanitizers,
            transforms: TransformRegistry::new(),
            matcher: RwLock::new(matcher),
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session store
    #[must_use]
    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    /// Sanitizer registry
    #[must_use]
    pub fn sanitizers(&self) -> &SanitizerRegistry {
        &self.sanitizers
    }

    /// Transform registry
    #[must_use]
    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// The global matcher
    #[must_use]
    pub fn matcher(&self) -> Arc<dyn Matcher> {
        Arc::clone(&*self.matcher.read())
    }

    /// Start a recording, persisted to `file` on stop or kept in memory
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a bad file path.
    pub fn start_recording(&self, file: Option<&str>) -> Result<String> {
        self.store.start_recording(file)
    }

    /// Stop a recording.
    ///
    /// `skip` is the `x-recording-skip` header: `request-response` discards
    /// the session instead of saving it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId`, `DuplicateSessionStop`,
    /// `InvalidRequest` for a bad skip value, or the write error.
    pub fn stop_recording(&self, id: &str, variables: Variables, skip: Option<&str>) -> Result<()> {
        let save = save_on_stop(skip)?;
        let sanitizers = self
            .store
            .get_recording(id)
            .map(|session| self.session_sanitizers(&session))
            .unwrap_or_default();

        self.store.stop_recording(
            id,
            StopOptions {
                variables,
                save,
                sanitizers,
            },
        )
    }

    /// Start a playback and return its id and the recording's variables
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound`, `InvalidFormat` or `UnknownRecordingId`.
    pub fn start_playback(&self, source: PlaybackSource) -> Result<(String, Variables)> {
        self.store.start_playback(source)
    }

    /// Stop a playback, optionally purging the cached source recording
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` or `DuplicateSessionStop`.
    pub fn stop_playback(&self, id: &str, purge: bool) -> Result<()> {
        self.store.stop_playback(id, purge)
    }

    /// Register a sanitizer by name, for one session or globally.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for bad options and
    /// `UnknownRecordingId` for an unknown session.
    pub fn add_sanitizer(&self, name: &str, options: &Value, recording_id: Option<&str>) -> Result<String> {
        let sanitizer = sanitizer_from_config(name, options)?;
        match recording_id {
            Some(recording_id) => {
                let session = self.store.get(recording_id)?;
                let id = self.sanitizers.register(sanitizer, false);
                session.add_sanitizer_id(id.clone());
                info!(recording_id, sanitizer = name, id = %id, "session sanitizer added");
                Ok(id)
            }
            None => {
                let id = self.sanitizers.register(sanitizer, true);
                info!(sanitizer = name, id = %id, "global sanitizer added");
                Ok(id)
            }
        }
    }

    /// Remove sanitizers by id.
    ///
    /// For a session the removal is sticky and hides the ids even if they
    /// are registered as defaults again later. Returns the ids removed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if any id was never registered, and
    /// `UnknownRecordingId` for an unknown session.
    pub fn remove_sanitizers(&self, ids: &[String], recording_id: Option<&str>) -> Result<Vec<String>> {
        let unknown: Vec<&str> = ids
            .iter()
            .filter(|id| !self.sanitizers.contains(id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(RecplayError::InvalidRequest(format!(
                "unknown sanitizer ids: {}",
                unknown.join(", ")
            )));
        }

        let removed = match recording_id {
            Some(recording_id) => self.store.get(recording_id)?.remove_sanitizer_ids(ids),
            None => self.sanitizers.remove_global(ids),
        };
        info!(recording_id = recording_id.unwrap_or("<global>"), removed = ?removed, "sanitizers removed");
        Ok(removed)
    }

    /// Register a response transform by name, for one session or globally
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for bad options and
    /// `UnknownRecordingId` for an unknown session.
    pub fn add_transform(&self, name: &str, options: &Value, recording_id: Option<&str>) -> Result<String> {
        let transform = transform_from_config(name, options)?;
        match recording_id {
            Some(recording_id) => {
                let session = self.store.get(recording_id)?;
                let registered = self.transforms.allocate(transform);
                let id = registered.id.clone();
                session.add_transform(registered);
                info!(recording_id, transform = name, id = %id, "session transform added");
                Ok(id)
            }
            None => {
                let id = self.transforms.register(transform);
                info!(transform = name, id = %id, "global transform added");
                Ok(id)
            }
        }
    }

    /// Install a matcher by name, for one session or globally
    ///
    /// # Errors
    ///
    /// Returns `MalformedMatcherConfig` for bad options and
    /// `UnknownRecordingId` for an unknown session.
    pub fn set_matcher(&self, name: &str, options: &Value, recording_id: Option<&str>) -> Result<()> {
        let matcher = matcher_from_config(name, options)?;
        match recording_id {
            Some(recording_id) => self.store.get(recording_id)?.set_matcher(matcher),
            None => *self.matcher.write() = matcher,
        }
        info!(recording_id = recording_id.unwrap_or("<global>"), matcher = name, "matcher set");
        Ok(())
    }

    /// Delay every playback response of a session
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` for an unknown session.
    pub fn set_playback_latency(&self, recording_id: &str, latency: Duration) -> Result<()> {
        self.store.get(recording_id)?.set_playback_latency(latency);
        debug!(recording_id, latency_ms = latency.as_millis() as u64, "playback latency set");
        Ok(())
    }

    /// Reset a session's overrides, or every registry when no id is given.
    ///
    /// A global reset also forgets session-registered sanitizer ids, so
    /// sessions fall back to the restored defaults.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId` for an unknown session.
    pub fn reset(&self, recording_id: Option<&str>) -> Result<()> {
        match recording_id {
            Some(recording_id) => {
                self.store.get(recording_id)?.reset();
                info!(recording_id, "session overrides reset");
            }
            None => {
                self.sanitizers.reset()?;
                self.transforms.reset();
                *self.matcher.write() = Arc::new(RecordMatcher::new(self.config.matching.clone()));
                info!("registries reset");
            }
        }
        Ok(())
    }

    /// Sanitizers in effect for `session`, resolved against the registry
    pub(super) fn session_sanitizers(&self, session: &ModifiableRecordSession) -> Vec<RegisteredSanitizer> {
        let ids = session.active_sanitizer_ids(&self.sanitizers.default_ids());
        self.sanitizers.resolve(&ids)
    }

    /// Matcher in effect for `session`
    pub(super) fn session_matcher(&self, session: &ModifiableRecordSession) -> Arc<dyn Matcher> {
        session.custom_matcher().unwrap_or_else(|| self.matcher())
    }

    /// Global transforms followed by the session's own
    pub(super) fn session_transforms(&self, session: &ModifiableRecordSession) -> Vec<RegisteredTransform> {
        let mut transforms = self.transforms.transforms();
        transforms.extend(session.additional_transforms());
        transforms
    }
}
