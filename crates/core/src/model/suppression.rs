use chrono::{DateTime, Duration, Utc};

/// Seconds a wipe keeps progress reads local-only.
pub const SUPPRESSION_WINDOW_SECS: i64 = 20;

/// Persisted timestamp of the most recent wipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WipeMarker {
    pub set_at: DateTime<Utc>,
}

impl WipeMarker {
    #[must_use]
    pub fn new(set_at: DateTime<Utc>) -> Self {
        Self { set_at }
    }

    /// Token that expires `window` after the marker was written.
    #[must_use]
    pub fn token(&self, window: Duration) -> SuppressionToken {
        SuppressionToken {
            expires_at: self.set_at + window,
        }
    }
}

/// Expiring permission to skip the remote store, handed out by a wipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionToken {
    pub expires_at: DateTime<Utc>,
}

impl SuppressionToken {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Caller options for a progress read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressRequest {
    pub ignore_server: bool,
    pub suppression: Option<SuppressionToken>,
}

impl ProgressRequest {
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            ignore_server: true,
            suppression: None,
        }
    }

    #[must_use]
    pub fn with_token(token: SuppressionToken) -> Self {
        Self {
            ignore_server: false,
            suppression: Some(token),
        }
    }
}

/// Why remote reads were skipped for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOnlyReason {
    Requested,
    WipeToken,
    WipeMarker,
}

/// Resolved, request-scoped read policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadContext {
    Live,
    LocalOnly(LocalOnlyReason),
}

impl ReadContext {
    /// Resolves a request against the current time and the persisted marker.
    #[must_use]
    pub fn resolve(
        request: ProgressRequest,
        marker: Option<WipeMarker>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        if request.ignore_server {
            return ReadContext::LocalOnly(LocalOnlyReason::Requested);
        }
        if request.suppression.is_some_and(|token| token.is_active(now)) {
            return ReadContext::LocalOnly(LocalOnlyReason::WipeToken);
        }
        if marker.is_some_and(|marker| marker.token(window).is_active(now)) {
            return ReadContext::LocalOnly(LocalOnlyReason::WipeMarker);
        }
        ReadContext::Live
    }

    #[must_use]
    pub fn include_remote(self) -> bool {
        matches!(self, ReadContext::Live)
    }
}
