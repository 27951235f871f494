use progress_core::achievements::{AchievementProgress, ProgressInputs, compute_progress};
use progress_core::model::{
    AttemptKind, AttemptRecord, CompletionDomain, KeySlot, ProgressRequest, ReadContext,
    WipeMarker,
};
use progress_core::time::{Clock, from_epoch_millis};

use chrono::{DateTime, Utc};

use crate::completion::CompletionTracker;
use crate::config::ProgressConfig;
use crate::counters::CounterStore;
use crate::history::HistoryReader;
use crate::store::LocalStore;

/// Gathers history, completion sets and counters into achievement percentages.
#[derive(Clone)]
pub struct AchievementService {
    clock: Clock,
    store: LocalStore,
    history: HistoryReader,
    completion: CompletionTracker,
    counters: CounterStore,
    config: ProgressConfig,
}

impl AchievementService {
    #[must_use]
    pub fn new(
        store: LocalStore,
        history: HistoryReader,
        completion: CompletionTracker,
        counters: CounterStore,
        config: ProgressConfig,
    ) -> Self {
        Self {
            clock: Clock::default(),
            store,
            history,
            completion,
            counters,
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve `request` against the persisted wipe marker and the current time.
    pub async fn resolve_context(&self, request: ProgressRequest) -> ReadContext {
        let marker = self.wipe_marker().await;
        ReadContext::resolve(request, marker, self.config.suppression_window, self.clock.now())
    }

    /// Percent progress (0-100) for every catalog achievement.
    ///
    /// Reads only; orphaned journal entries are left for the next history read.
    pub async fn compute_progress(&self, request: ProgressRequest) -> AchievementProgress {
        let ctx = self.resolve_context(request).await;
        tracing::debug!(?ctx, "computing achievement progress");

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        for kind in AttemptKind::ALL {
            let merged = self
                .history
                .collect(kind, self.config.history_limit, ctx)
                .await;
            attempts.extend(merged.rows);
        }

        let inputs = ProgressInputs {
            disaster: self.completion.count_completed(CompletionDomain::Disaster).await,
            everyday: self.completion.count_completed(CompletionDomain::Everyday).await,
            counters: self.counters.snapshot().await,
            has_perfect_attempt: attempts.iter().any(AttemptRecord::is_perfect),
            has_fast_attempt: attempts.iter().any(|a| self.is_fast(a)),
            attempts: count_u32(attempts.len()),
            first_aid_attempts: count_u32(
                attempts
                    .iter()
                    .filter(|a| a.kind == AttemptKind::FirstAid)
                    .count(),
            ),
        };
        compute_progress(&inputs)
    }

    fn is_fast(&self, attempt: &AttemptRecord) -> bool {
        attempt.time_spent_ms > 0 && attempt.time_spent_ms <= self.config.speed_threshold_ms
    }

    async fn wipe_marker(&self) -> Option<WipeMarker> {
        let raw = self.store.read_raw(&KeySlot::WipeMarker.into()).await?;
        let parsed = parse_marker(&raw);
        if parsed.is_none() {
            tracing::warn!(%raw, "unreadable wipe marker, ignoring");
        }
        parsed.map(WipeMarker::new)
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Epoch milliseconds as a number or string, or an RFC 3339 string.
fn parse_marker(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim().trim_matches('"').trim();
    if let Ok(millis) = text.parse::<i64>() {
        return from_epoch_millis(millis);
    }
    if let Ok(millis) = text.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        return from_epoch_millis(millis as i64);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;

    #[test]
    fn marker_formats_are_accepted() {
        let millis = fixed_now().timestamp_millis();
        assert_eq!(parse_marker(&millis.to_string()), Some(fixed_now()));
        assert_eq!(parse_marker(&format!("\"{millis}\"")), Some(fixed_now()));
        assert_eq!(parse_marker("1700000000000.0"), Some(fixed_now()));
        assert_eq!(parse_marker("\"2023-11-14T22:13:20Z\""), Some(fixed_now()));
        assert_eq!(parse_marker("soon"), None);
    }
}
