//! Ordered entry pool with match-and-consume lookup

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::matching::Matcher;
use crate::sanitize::{sanitize_entries, sanitize_entry, RegisteredSanitizer};
use crate::{RecplayError, Result};

use super::entry::RecordEntry;
use super::variables::Variables;

#[derive(Debug, Default)]
struct EntryPool {
    // Entries as recorded or loaded, before pool sanitizers ran
    recorded: Vec<RecordEntry>,
    // `recorded` with `applied` run over it; matching happens here
    entries: Vec<RecordEntry>,
    applied: Vec<String>,
}

impl EntryPool {
    fn new(entries: Vec<RecordEntry>) -> Self {
        Self {
            recorded: entries.clone(),
            entries,
            applied: Vec::new(),
        }
    }

    /// Bring `entries` in line with `sanitizers`.
    ///
    /// New ids appended to the active set are applied on top. Any other
    /// change (an id removed or reordered) re-derives the view from the
    /// recorded entries, so a removed sanitizer stops applying to both sides.
    fn sync(&mut self, sanitizers: &[RegisteredSanitizer]) {
        let extends = sanitizers.len() >= self.applied.len()
            && sanitizers
                .iter()
                .zip(&self.applied)
                .all(|(registered, id)| registered.id == *id);

        if extends {
            let pending = &sanitizers[self.applied.len()..];
            if pending.is_empty() {
                return;
            }
            sanitize_entries(&mut self.entries, pending);
        } else {
            debug!(
                previous = ?self.applied,
                entries = self.recorded.len(),
                "sanitizer set changed, rebuilding pool"
            );
            self.entries = self.recorded.clone();
            sanitize_entries(&mut self.entries, sanitizers);
        }
        self.applied = sanitizers.iter().map(|registered| registered.id.clone()).collect();
    }

    fn insert(&mut self, entry: RecordEntry) {
        let position = sequence_position(&self.recorded, entry.sequence);
        self.recorded.insert(position, entry.clone());
        let position = sequence_position(&self.entries, entry.sequence);
        self.entries.insert(position, entry);
    }

    fn take(&mut self, index: usize) -> RecordEntry {
        let entry = self.entries.remove(index);
        if let Some(position) = self
            .recorded
            .iter()
            .position(|recorded| recorded.sequence == entry.sequence)
        {
            self.recorded.remove(position);
        }
        entry
    }
}

// Index after every entry that started no later than `sequence`
fn sequence_position(entries: &[RecordEntry], sequence: u64) -> usize {
    entries
        .iter()
        .rposition(|existing| existing.sequence <= sequence)
        .map_or(0, |index| index + 1)
}

/// An ordered sequence of exchanges plus session variables.
///
/// All pool mutation goes through one mutex; matching, consuming and
/// appending each happen inside a single lock scope and never across an
/// await point.
#[derive(Debug, Default)]
pub struct RecordSession {
    pool: Mutex<EntryPool>,
    variables: RwLock<Variables>,
    next_sequence: AtomicU64,
}

impl RecordSession {
    /// Create an empty session for recording
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from stored entries, keeping their order
    #[must_use]
    pub fn from_parts(mut entries: Vec<RecordEntry>, variables: Variables) -> Self {
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.sequence = index as u64;
        }
        let next = entries.len() as u64;
        Self {
            pool: Mutex::new(EntryPool::new(entries)),
            variables: RwLock::new(variables),
            next_sequence: AtomicU64::new(next),
        }
    }

    /// Reserve the ordering key for an exchange that is starting now
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert an entry in sequence order.
    ///
    /// Exchanges can finish out of order; the entry lands after every entry
    /// that started before it.
    pub fn record(&self, entry: RecordEntry) {
        debug!(
            method = %entry.request_method,
            uri = %entry.request_uri,
            sequence = entry.sequence,
            "recorded entry"
        );
        self.pool.lock().insert(entry);
    }

    /// Find the entry that answers `request`.
    ///
    /// A copy of the request is sanitized outside the lock. Under the lock,
    /// the pool is brought in line with the same sanitizers, the matcher
    /// runs, and the hit is removed when `consume` is set.
    ///
    /// # Errors
    ///
    /// Returns `NoMatchFound` with the matcher's diagnostic; the pool is
    /// left untouched in that case.
    pub fn lookup(
        &self,
        request: &RecordEntry,
        matcher: &dyn Matcher,
        sanitizers: &[RegisteredSanitizer],
        consume: bool,
    ) -> Result<RecordEntry> {
        let mut sanitized = request.clone();
        sanitize_entry(&mut sanitized, sanitizers);

        let mut pool = self.pool.lock();
        pool.sync(sanitizers);

        match matcher.find_match(&sanitized, &pool.entries) {
            Ok(index) if consume => Ok(pool.take(index)),
            Ok(index) => Ok(pool.entries[index].clone()),
            Err(diagnostic) => Err(RecplayError::NoMatchFound {
                method: sanitized.request_method,
                uri: sanitized.request_uri,
                diagnostic,
            }),
        }
    }

    /// Run sanitizers over every stored entry.
    ///
    /// Ids already applied are skipped; a set that dropped ids is
    /// re-applied from the recorded entries.
    pub fn sanitize(&self, sanitizers: &[RegisteredSanitizer]) {
        self.pool.lock().sync(sanitizers);
    }

    /// Canonicalize every stored JSON request body
    pub fn normalize_request_bodies(&self) {
        let mut pool = self.pool.lock();
        let pool = &mut *pool;
        for entry in pool.recorded.iter_mut().chain(pool.entries.iter_mut()) {
            entry.request.normalize_json_body();
        }
    }

    /// Snapshot of the remaining entries
    #[must_use]
    pub fn entries(&self) -> Vec<RecordEntry> {
        self.pool.lock().entries.clone()
    }

    /// Number of remaining entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.lock().entries.len()
    }

    /// True when no entries remain
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the session variables
    #[must_use]
    pub fn variables(&self) -> Variables {
        self.variables.read().clone()
    }

    /// Merge variables into the session
    pub fn set_variables(&self, variables: Variables) {
        self.variables.write().extend(variables);
    }
}
