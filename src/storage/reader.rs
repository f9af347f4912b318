//! Recording file reader

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::format::{Recording, RecordingFile};
use crate::{RecplayError, Result};

/// A recording file loaded from disk
#[derive(Debug)]
pub struct RecordingReader {
    path: PathBuf,
    recording: Recording,
}

impl RecordingReader {
    /// Open and parse a recording file
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the file does not exist and `InvalidFormat`
    /// if it is not a valid recording.
    pub fn open(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RecplayError::FileNotFound(path.display().to_string()),
            _ => RecplayError::Io(e),
        })?;
        let recording = from_json(&text).map_err(|e| match e {
            RecplayError::InvalidFormat(reason) => {
                RecplayError::InvalidFormat(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;

        debug!(
            path = %path.display(),
            entries = recording.entries.len(),
            "read recording"
        );

        Ok(Self {
            path: path.to_path_buf(),
            recording,
        })
    }

    /// Path the recording was read from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries in the file
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.recording.entries.len()
    }

    /// Borrow the parsed recording
    #[must_use]
    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Take the parsed recording
    #[must_use]
    pub fn into_recording(self) -> Recording {
        self.recording
    }
}

/// Parse a recording from JSON text
///
/// # Errors
///
/// Returns `InvalidFormat` if the text is not a valid recording.
pub fn from_json(text: &str) -> Result<Recording> {
    let file: RecordingFile = serde_json::from_str(text)
        .map_err(|e| RecplayError::InvalidFormat(e.to_string()))?;
    file.into_recording()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_recording() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Entries":[{{"RequestUri":"http://h/a","RequestMethod":"GET","RequestHeaders":{{}},"RequestBody":null,"StatusCode":200,"ResponseHeaders":{{}},"ResponseBody":"A"}}],"Variables":{{"k":"v"}}}}"#
        )
        .unwrap();

        let reader = RecordingReader::open(file.path()).unwrap();
        assert_eq!(reader.entry_count(), 1);
        assert_eq!(reader.recording().variables.get("K"), Some("v"));
        assert_eq!(reader.into_recording().entries[0].response.body, b"A");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecordingReader::open(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(RecplayError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"Entries\": 5}}").unwrap();

        let result = RecordingReader::open(file.path());
        assert!(matches!(result, Err(RecplayError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_sections_default() {
        let recording = from_json("{}").unwrap();
        assert!(recording.entries.is_empty());
        assert!(recording.variables.is_empty());
    }
}
