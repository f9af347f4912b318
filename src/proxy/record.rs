//! Record mode: forward upstream and capture the exchange

use tracing::{debug, warn};

use super::{EntryRecordMode, ProxyRequest, ProxyResponse, RecordingHandler, RECORDING_SKIP_HEADER};
use crate::network::UpstreamRequest;
use crate::recording::RecordEntry;
use crate::sanitize::sanitize_entry;
use crate::Result;

impl RecordingHandler {
    /// Forward `request` upstream and append the exchange to the recording.
    ///
    /// The entry's sequence is taken before forwarding, so concurrent
    /// exchanges are stored in the order they started. No session lock is
    /// held while the upstream call is in flight. The raw upstream response
    /// is returned; only the stored copy is sanitized.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId`, `InvalidRequest`, `UpstreamTimeout` or
    /// `UpstreamConnectionFailure`. Nothing is recorded on error.
    pub async fn handle_record_request(
        &self,
        recording_id: &str,
        request: ProxyRequest,
    ) -> Result<ProxyResponse> {
        let session = self.store.get_recording(recording_id)?;
        let mode = EntryRecordMode::from_header(request.header(RECORDING_SKIP_HEADER))?;
        let uri = request.upstream_uri()?;
        let headers = request.forwarded_headers();
        let sequence = session.session().next_sequence();

        let response = self
            .upstream
            .send(UpstreamRequest {
                method: request.method.clone(),
                uri: uri.clone(),
                headers: headers.clone(),
                body: request.body.clone(),
            })
            .await
            .map_err(|e| {
                warn!(recording_id, method = %request.method, uri = %uri, error = %e, "upstream request failed");
                e
            })?;

        if mode == EntryRecordMode::DontRecord {
            debug!(recording_id, method = %request.method, uri = %uri, "exchange not recorded");
            return Ok(response);
        }

        let body = if mode == EntryRecordMode::RecordWithoutRequestBody {
            Vec::new()
        } else {
            request.body.to_vec()
        };
        let mut entry = RecordEntry::from_request(&request.method, uri, headers, body).with_response(
            response.status,
            response.recorded_headers(),
            response.body.to_vec(),
        );
        entry.sequence = sequence;
        sanitize_entry(&mut entry, &self.session_sanitizers(&session));

        debug!(
            recording_id,
            method = %entry.request_method,
            uri = %entry.request_uri,
            status = entry.status_code,
            sequence,
            "recorded exchange"
        );
        session.session().record(entry);
        Ok(response)
    }
}
