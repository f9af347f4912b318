//! Playback mode: serve recorded responses

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ProxyRequest, ProxyResponse, RecordingHandler};
use crate::recording::RecordEntry;
use crate::transform::apply_transforms;
use crate::{RecplayError, Result};

impl RecordingHandler {
    /// Answer `request` from the playback session's remaining entries.
    ///
    /// Any configured latency is waited out first and races `cancel`; a
    /// cancelled request consumes nothing. Session variables are
    /// substituted into the request, then the session's matcher finds the
    /// entry and the global and session transforms rewrite a copy of it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRecordingId`, `InvalidRequest`, `Cancelled` or
    /// `NoMatchFound`.
    pub async fn handle_playback_request(
        &self,
        recording_id: &str,
        request: ProxyRequest,
        cancel: &CancellationToken,
    ) -> Result<ProxyResponse> {
        let session = self.store.get_playback(recording_id)?;

        let latency = session.playback_latency();
        if !latency.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(latency) => {}
                () = cancel.cancelled() => {
                    debug!(recording_id, "playback cancelled during latency");
                    return Err(RecplayError::Cancelled);
                }
            }
        }

        let uri = request.upstream_uri()?;
        let mut live = RecordEntry::from_request(
            &request.method,
            uri,
            request.forwarded_headers(),
            request.body.to_vec(),
        );
        live.substitute_variables(&session.session().variables());

        let matcher = self.session_matcher(&session);
        let consume = !self.config.playback.allow_repeat_matches;
        let mut matched = session
            .session()
            .lookup(&live, matcher.as_ref(), &self.session_sanitizers(&session), consume)
            .map_err(|e| {
                warn!(recording_id, method = %live.request_method, uri = %live.request_uri, "no match found");
                e
            })?;

        apply_transforms(&self.session_transforms(&session), &live, &mut matched);
        debug!(
            recording_id,
            method = %live.request_method,
            uri = %live.request_uri,
            status = matched.status_code,
            remaining = session.session().len(),
            "served recorded response"
        );

        Ok(ProxyResponse::new(
            matched.status_code,
            matched.response.headers,
            matched.response.body,
        ))
    }
}
