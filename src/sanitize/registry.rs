//! Process-wide sanitizer registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::Result;

use super::{HeaderRegexSanitizer, OAuthResponseSanitizer, RegisteredSanitizer, Sanitizer};

/// Ids of the built-in default sanitizers
pub const DEFAULT_SANITIZER_IDS: [&str; 4] = [
    "default-authorization",
    "default-api-key",
    "default-subscription-key",
    "default-oauth-response",
];

#[derive(Debug, Default)]
struct RegistryState {
    sanitizers: HashMap<String, RegisteredSanitizer>,
    // Global defaults, in application order
    defaults: Vec<String>,
    next_id: u64,
}

/// Holds every registered sanitizer by id and the global default set.
///
/// Sessions refer to sanitizers by id only; a session's effective set is
/// resolved against this registry at each request.
#[derive(Debug)]
pub struct SanitizerRegistry {
    state: RwLock<RegistryState>,
    builtin_defaults: bool,
}

impl SanitizerRegistry {
    /// Create a registry, optionally seeded with the built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in sanitizer fails to compile.
    pub fn new(builtin_defaults: bool) -> Result<Self> {
        let registry = Self {
            state: RwLock::new(RegistryState::default()),
            builtin_defaults,
        };
        registry.install_builtins()?;
        Ok(registry)
    }

    fn install_builtins(&self) -> Result<()> {
        if !self.builtin_defaults {
            return Ok(());
        }
        let builtins: [(&str, Arc<dyn Sanitizer>); 4] = [
            (
                DEFAULT_SANITIZER_IDS[0],
                Arc::new(HeaderRegexSanitizer::new("Authorization", "Sanitized", None, None, None)?),
            ),
            (
                DEFAULT_SANITIZER_IDS[1],
                Arc::new(HeaderRegexSanitizer::new("api-key", "Sanitized", None, None, None)?),
            ),
            (
                DEFAULT_SANITIZER_IDS[2],
                Arc::new(HeaderRegexSanitizer::new(
                    "Ocp-Apim-Subscription-Key",
                    "Sanitized",
                    None,
                    None,
                    None,
                )?),
            ),
            (DEFAULT_SANITIZER_IDS[3], Arc::new(OAuthResponseSanitizer::new()?)),
        ];
        let mut state = self.state.write();
        for (id, sanitizer) in builtins {
            state
                .sanitizers
                .insert(id.to_string(), RegisteredSanitizer::new(id, sanitizer));
            state.defaults.push(id.to_string());
        }
        Ok(())
    }

    /// Register a sanitizer under a fresh id.
    ///
    /// Global registrations join the default set every session uses.
    pub fn register(&self, sanitizer: Arc<dyn Sanitizer>, global: bool) -> String {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = format!("sanitizer-{}", state.next_id);
        debug!(id = %id, name = sanitizer.name(), global, "registered sanitizer");
        state
            .sanitizers
            .insert(id.clone(), RegisteredSanitizer::new(id.clone(), sanitizer));
        if global {
            state.defaults.push(id.clone());
        }
        id
    }

    /// Ids of the global default set, in order
    #[must_use]
    pub fn default_ids(&self) -> Vec<String> {
        self.state.read().defaults.clone()
    }

    /// Look up sanitizers by id, in the given order; unknown ids are skipped
    #[must_use]
    pub fn resolve(&self, ids: &[String]) -> Vec<RegisteredSanitizer> {
        let state = self.state.read();
        ids.iter()
            .filter_map(|id| state.sanitizers.get(id).cloned())
            .collect()
    }

    /// True when a sanitizer is registered under `id`
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().sanitizers.contains_key(id)
    }

    /// Drop ids from the global default set; returns the ids that were present
    pub fn remove_global(&self, ids: &[String]) -> Vec<String> {
        let mut state = self.state.write();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(position) = state.defaults.iter().position(|existing| existing == id) {
                state.defaults.remove(position);
                removed.push(id.clone());
            }
        }
        removed
    }

    /// Forget every registration and restore the built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in sanitizer fails to compile.
    pub fn reset(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.sanitizers.clear();
            state.defaults.clear();
        }
        self.install_builtins()
    }
}
