//! Recording file writer

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::format::{Recording, RecordingFile};
use crate::Result;

/// Writes recordings to one path, replacing the file atomically
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    path: PathBuf,
}

impl RecordingWriter {
    /// Create a writer for `path`; nothing is touched until `write`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and write the recording.
    ///
    /// Parent directories are created. The data goes to a sibling temp file
    /// that is synced and renamed over the target, so readers never see a
    /// partial file.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or any filesystem step fails.
    pub fn write(&self, recording: &Recording) -> Result<()> {
        let json = to_json(recording)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        temp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let temp_path = self.path.with_file_name(temp_name);

        let result = (|| -> Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        debug!(
            path = %self.path.display(),
            entries = recording.entries.len(),
            "wrote recording"
        );
        Ok(())
    }
}

/// Serialize a recording to pretty-printed JSON
///
/// # Errors
///
/// Returns `Json` if serialization fails.
pub fn to_json(recording: &Recording) -> Result<String> {
    Ok(serde_json::to_string_pretty(&RecordingFile::from(recording))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Headers, RecordEntry, Variables};
    use crate::storage::RecordingReader;

    fn sample() -> Recording {
        let entry = RecordEntry::from_request("GET", "http://h/a", Headers::new(), vec![])
            .with_response(200, Headers::new(), b"A".to_vec());
        Recording::new(vec![entry], [("name", "value")].into_iter().collect::<Variables>())
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/recording.json");

        RecordingWriter::new(&path).write(&sample()).unwrap();

        let reader = RecordingReader::open(&path).unwrap();
        assert_eq!(reader.recording(), &sample());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.json");
        let writer = RecordingWriter::new(&path);

        writer.write(&sample()).unwrap();
        writer.write(&Recording::default()).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(RecordingReader::open(&path).unwrap().recording().entries.is_empty());
    }

    #[test]
    fn test_json_layout() {
        let json = to_json(&sample()).unwrap();
        assert!(json.contains("\"Entries\""));
        assert!(json.contains("\"Variables\""));
        assert!(json.contains("\"ResponseBody\": \"A\""));
    }
}
