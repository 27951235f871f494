use std::sync::Arc;

use progress_core::model::{AttemptDraft, AttemptId, AttemptRecord};
use progress_core::time::Clock;
use storage::repository::{IdentityProvider, RemoteAttemptStore};

use crate::error::ProgressServiceError;
use crate::local_attempts::LocalAttemptStore;

/// What happened to one recorded attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// `false` only when both the remote write and the local fallback failed.
    pub persisted: bool,
    /// The row went to the local fallback bucket instead of the remote store.
    pub used_fallback: bool,
    pub record: AttemptRecord,
}

/// Writes each finished attempt to exactly one of the remote store or the
/// local fallback bucket for its kind.
#[derive(Clone)]
pub struct AttemptRecorder {
    clock: Clock,
    local: LocalAttemptStore,
    remote: Arc<dyn RemoteAttemptStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AttemptRecorder {
    #[must_use]
    pub fn new(
        local: LocalAttemptStore,
        remote: Arc<dyn RemoteAttemptStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            clock: Clock::default(),
            local,
            remote,
            identity,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Record an attempt. Remote first; any failure falls back to the local
    /// bucket. No retries.
    pub async fn record(&self, draft: AttemptDraft) -> RecordOutcome {
        let record = draft.into_record(AttemptId::generate(), self.clock.now());

        let remote_err = match self.write_remote(&record).await {
            Ok(()) => {
                tracing::debug!(id = %record.id, kind = %record.kind, "attempt stored remotely");
                return RecordOutcome {
                    persisted: true,
                    used_fallback: false,
                    record,
                };
            }
            Err(err) => err,
        };

        tracing::info!(kind = %record.kind, error = %remote_err, "remote write failed, using local fallback");
        let persisted = match self.local.append(record.kind, record.clone()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(id = %record.id, error = %err, "attempt could not be stored anywhere");
                false
            }
        };
        RecordOutcome {
            persisted,
            used_fallback: true,
            record,
        }
    }

    async fn write_remote(&self, record: &AttemptRecord) -> Result<(), ProgressServiceError> {
        let user = self.identity.current_user().await?;
        self.remote.insert(&user, record).await?;
        Ok(())
    }
}
