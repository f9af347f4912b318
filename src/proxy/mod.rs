//! Record and playback orchestration

mod handler;
mod playback;
mod record;
mod request;

pub use handler::RecordingHandler;
pub use request::{ProxyRequest, ProxyResponse};

use crate::{RecplayError, Result};

/// Recording id issued on start and echoed on every later request
pub const RECORDING_ID_HEADER: &str = "x-recording-id";
/// Recording file for start calls
pub const RECORDING_FILE_HEADER: &str = "x-recording-file";
/// `record` or `playback` on proxied requests
pub const RECORDING_MODE_HEADER: &str = "x-recording-mode";
/// Per-request skip mode, or session discard on stop
pub const RECORDING_SKIP_HEADER: &str = "x-recording-skip";
/// Scheme and authority of the real service
pub const UPSTREAM_BASE_URI_HEADER: &str = "x-recording-upstream-base-uri";
/// Drop the cached source recording on playback stop
pub const PURGE_IN_MEMORY_HEADER: &str = "x-purge-inmemory-recording";
/// Sanitizer, transform or matcher name on admin calls
pub const ABSTRACTION_IDENTIFIER_HEADER: &str = "x-abstraction-identifier";

pub(crate) const RECORDING_HEADER_PREFIX: &str = "x-recording-";

const SKIP_REQUEST_RESPONSE: &str = "request-response";
const SKIP_REQUEST_BODY: &str = "request-body";

/// How one exchange is captured in record mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryRecordMode {
    /// Forward and record
    #[default]
    Record,
    /// Forward only
    DontRecord,
    /// Forward, record with an empty request body
    RecordWithoutRequestBody,
}

impl EntryRecordMode {
    /// Parse the `x-recording-skip` header value
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown values.
    pub fn from_header(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::Record),
            Some(v) if v.eq_ignore_ascii_case(SKIP_REQUEST_RESPONSE) => Ok(Self::DontRecord),
            Some(v) if v.eq_ignore_ascii_case(SKIP_REQUEST_BODY) => {
                Ok(Self::RecordWithoutRequestBody)
            }
            Some(v) => Err(RecplayError::InvalidRequest(format!(
                "'{RECORDING_SKIP_HEADER}' must be '{SKIP_REQUEST_RESPONSE}' or \
                 '{SKIP_REQUEST_BODY}', got '{v}'"
            ))),
        }
    }
}

/// Whether a stopped recording is persisted, from `x-recording-skip`
///
/// # Errors
///
/// Returns `InvalidRequest` for any value other than `request-response`.
pub fn save_on_stop(skip: Option<&str>) -> Result<bool> {
    match skip.map(str::trim) {
        None | Some("") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case(SKIP_REQUEST_RESPONSE) => Ok(false),
        Some(v) => Err(RecplayError::InvalidRequest(format!(
            "'{RECORDING_SKIP_HEADER}' on stop only accepts '{SKIP_REQUEST_RESPONSE}', got '{v}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_record_mode() {
        assert_eq!(EntryRecordMode::from_header(None).unwrap(), EntryRecordMode::Record);
        assert_eq!(
            EntryRecordMode::from_header(Some("Request-Response")).unwrap(),
            EntryRecordMode::DontRecord
        );
        assert_eq!(
            EntryRecordMode::from_header(Some("request-body")).unwrap(),
            EntryRecordMode::RecordWithoutRequestBody
        );
        assert!(EntryRecordMode::from_header(Some("everything")).is_err());
    }

    #[test]
    fn test_save_on_stop() {
        assert!(save_on_stop(None).unwrap());
        assert!(!save_on_stop(Some("request-response")).unwrap());
        assert!(matches!(
            save_on_stop(Some("request-body")),
            Err(RecplayError::InvalidRequest(_))
        ));
    }
}
