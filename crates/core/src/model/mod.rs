mod attempt;
mod completion;
mod counters;
mod ids;
mod keys;
mod suppression;

pub use attempt::{
    AttemptDraft, AttemptError, AttemptIndexEntry, AttemptKey, AttemptKind, AttemptRecord,
    LOCAL_BUCKET_CAP,
};
pub use completion::{CompletionCount, CompletionDomain, CompletionSet};
pub use counters::{CounterSnapshot, ReadArticleSet, StreakState};
pub use ids::{AttemptId, ParseIdError, UserId};
pub use keys::{FallbackBucket, KeySlot, StorageKey};
pub use suppression::{
    LocalOnlyReason, ProgressRequest, ReadContext, SUPPRESSION_WINDOW_SECS, SuppressionToken,
    WipeMarker,
};
