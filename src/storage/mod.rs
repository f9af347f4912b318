//! JSON storage for recordings

mod cache;
mod format;
mod reader;
mod writer;

use std::path::{Component, Path, PathBuf};

pub use cache::RecordingCache;
pub use format::{BodyEncoding, EntryDto, Recording, RecordingFile};
pub use reader::{from_json, RecordingReader};
pub use writer::{to_json, RecordingWriter};

use crate::{RecplayError, Result};

/// Resolve a client-supplied recording path against the storage root.
///
/// Absolute paths are used as given. Relative paths may not climb out of
/// the root with `..`.
///
/// # Errors
///
/// Returns `InvalidRequest` for an empty path or one that escapes the root.
pub fn resolve_path(root: &Path, file: &str) -> Result<PathBuf> {
    if file.trim().is_empty() {
        return Err(RecplayError::InvalidRequest(
            "recording file path is empty".to_string(),
        ));
    }
    let requested = Path::new(file);
    if requested.is_absolute() {
        return Ok(requested.to_path_buf());
    }
    if requested
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(RecplayError::InvalidRequest(format!(
            "recording file '{file}' may not contain '..'"
        )));
    }
    Ok(root.join(requested))
}
