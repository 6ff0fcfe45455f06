//! Image-generation status polling.

use crate::api::{ChatApi, GenerationStatus};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Terminal result of polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job produced final content.
    Completed(String),
    /// The server reported failure.
    Failed,
    /// The status request itself failed.
    Unreachable(String),
}

/// Tracks the single outstanding image job.
///
/// Beginning a new job cancels the previous one; at most one poll loop is
/// live at a time.
#[derive(Debug, Default)]
pub struct ImagePoller {
    current: Mutex<Option<(String, CancellationToken)>>,
}

impl ImagePoller {
    /// Poller with no job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request_id` as the current job and return its cancellation
    /// token. Any previous job is cancelled.
    pub fn begin(&self, request_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, cancel)) = slot.replace((request_id.to_owned(), token.clone())) {
            debug!(%previous, "superseding image poll");
            cancel.cancel();
        }
        token
    }

    /// Clear the job if it is still `request_id`.
    pub fn finish(&self, request_id: &str) {
        let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(id, _)| id == request_id) {
            *slot = None;
        }
    }

    /// Cancel the current job, if any.
    pub fn cancel(&self) {
        if let Some((id, cancel)) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!(request_id = %id, "image poll cancelled");
            cancel.cancel();
        }
    }

    /// Id of the job being polled.
    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(id, _)| id.clone())
    }
}

/// Poll `request_id` until it reaches a terminal state.
///
/// The first request goes out immediately, then one per `interval`. Returns
/// `None` if `cancel` fires first.
pub async fn poll_until_done(
    api: &dyn ChatApi,
    session_id: &str,
    request_id: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Option<PollOutcome> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            status = api.generation_status(session_id, request_id) => status,
        };
        match status {
            Ok(GenerationStatus::Completed { content }) => {
                return Some(PollOutcome::Completed(content));
            }
            Ok(GenerationStatus::Failed) => return Some(PollOutcome::Failed),
            Ok(GenerationStatus::Pending { status }) => {
                debug!(%request_id, %status, "image still generating");
            }
            Err(e) => {
                warn!(%request_id, error = %e, "generation status check failed");
                return Some(PollOutcome::Unreachable(e.to_string()));
            }
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
