use std::env;

use chrono::Duration;
use progress_core::achievements::SPEED_THRESHOLD_MS;
use progress_core::model::{LOCAL_BUCKET_CAP, SUPPRESSION_WINDOW_SECS};

/// Tunables shared by the progress services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressConfig {
    /// Rows retained per local fallback bucket and in the attempt index.
    pub local_bucket_cap: usize,
    /// Upper bound for any history read.
    pub history_limit: usize,
    /// How long a wipe keeps progress reads local-only.
    pub suppression_window: Duration,
    /// Attempts at or under this duration count as fast.
    pub speed_threshold_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            local_bucket_cap: LOCAL_BUCKET_CAP,
            history_limit: LOCAL_BUCKET_CAP,
            suppression_window: Duration::seconds(SUPPRESSION_WINDOW_SECS),
            speed_threshold_ms: SPEED_THRESHOLD_MS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

impl ProgressConfig {
    /// Defaults overridden by `PROGRESS_BUCKET_CAP`, `PROGRESS_HISTORY_LIMIT`,
    /// `PROGRESS_SUPPRESSION_SECS` and `PROGRESS_SPEED_MS` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            local_bucket_cap: env_parse("PROGRESS_BUCKET_CAP")
                .filter(|cap: &usize| *cap > 0)
                .unwrap_or(defaults.local_bucket_cap),
            history_limit: env_parse("PROGRESS_HISTORY_LIMIT")
                .filter(|limit: &usize| *limit > 0)
                .unwrap_or(defaults.history_limit),
            suppression_window: env_parse("PROGRESS_SUPPRESSION_SECS")
                .map(Duration::seconds)
                .unwrap_or(defaults.suppression_window),
            speed_threshold_ms: env_parse("PROGRESS_SPEED_MS")
                .unwrap_or(defaults.speed_threshold_ms),
        }
    }

    /// Clamp a caller-supplied history limit to the configured bound.
    #[must_use]
    pub fn clamp_limit(&self, requested: usize) -> usize {
        requested.min(self.history_limit)
    }
}
