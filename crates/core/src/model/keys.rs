use std::borrow::Cow;
use std::fmt;

use crate::model::attempt::AttemptKind;
use crate::model::completion::CompletionDomain;
use crate::model::ids::AttemptId;

const ATTEMPT_DETAIL_PREFIX: &str = "attempt:";

/// Local fallback buckets, one per persisted kind spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackBucket {
    Disaster,
    FirstAid,
    /// Pre-rename spelling of `FirstAid`; read but never written.
    EverydayFirstAid,
}

impl FallbackBucket {
    pub const ALL: [FallbackBucket; 3] = [
        FallbackBucket::Disaster,
        FallbackBucket::FirstAid,
        FallbackBucket::EverydayFirstAid,
    ];

    /// Bucket new fallback rows for `kind` are written to.
    #[must_use]
    pub fn for_kind(kind: AttemptKind) -> Self {
        match kind {
            AttemptKind::Disaster => FallbackBucket::Disaster,
            AttemptKind::FirstAid => FallbackBucket::FirstAid,
        }
    }

    /// Every bucket that holds rows of `kind`, current bucket first.
    #[must_use]
    pub fn read_set(kind: AttemptKind) -> &'static [FallbackBucket] {
        match kind {
            AttemptKind::Disaster => &[FallbackBucket::Disaster],
            AttemptKind::FirstAid => &[FallbackBucket::FirstAid, FallbackBucket::EverydayFirstAid],
        }
    }

    #[must_use]
    pub fn kind(self) -> AttemptKind {
        match self {
            FallbackBucket::Disaster => AttemptKind::Disaster,
            FallbackBucket::FirstAid | FallbackBucket::EverydayFirstAid => AttemptKind::FirstAid,
        }
    }
}

/// Fixed storage slots. Every on-disk key except per-attempt details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    Shares,
    ReadIds,
    StreakCount,
    StreakLastActive,
    Completed(CompletionDomain),
    WipeMarker,
    AttemptIndex,
    Fallback(FallbackBucket),
}

const SLOT_TABLE: [(KeySlot, &str); 11] = [
    (KeySlot::Shares, "progress.shares"),
    (KeySlot::ReadIds, "knowledge.readIds"),
    (KeySlot::StreakCount, "streak.count"),
    (KeySlot::StreakLastActive, "streak.lastActive"),
    (
        KeySlot::Completed(CompletionDomain::Disaster),
        "progress.disaster.completed",
    ),
    (
        KeySlot::Completed(CompletionDomain::Everyday),
        "progress.everyday.completed",
    ),
    (KeySlot::WipeMarker, "progress.wipe.skipServer"),
    (KeySlot::AttemptIndex, "attemptIndex"),
    (
        KeySlot::Fallback(FallbackBucket::Disaster),
        "quiz_history_fallback_disaster",
    ),
    (
        KeySlot::Fallback(FallbackBucket::FirstAid),
        "quiz_history_fallback_firstaid",
    ),
    (
        KeySlot::Fallback(FallbackBucket::EverydayFirstAid),
        "quiz_history_fallback_everydayfirstaid",
    ),
];

impl KeySlot {
    /// On-disk key for this slot.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        SLOT_TABLE
            .iter()
            .find(|(slot, _)| *slot == self)
            .map_or("", |(_, key)| *key)
    }

    /// Every fixed slot, in table order.
    pub fn all() -> impl Iterator<Item = KeySlot> {
        SLOT_TABLE.iter().map(|(slot, _)| *slot)
    }

    fn parse(raw: &str) -> Option<KeySlot> {
        SLOT_TABLE
            .iter()
            .find(|(_, key)| *key == raw)
            .map(|(slot, _)| *slot)
    }
}

/// A key owned by the progress layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Slot(KeySlot),
    AttemptDetail(AttemptId),
}

impl StorageKey {
    #[must_use]
    pub fn as_key(&self) -> Cow<'static, str> {
        match self {
            StorageKey::Slot(slot) => Cow::Borrowed(slot.as_str()),
            StorageKey::AttemptDetail(id) => Cow::Owned(format!("{ATTEMPT_DETAIL_PREFIX}{id}")),
        }
    }

    /// Classifies a raw key. Keys owned by other parts of the app yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<StorageKey> {
        if let Some(slot) = KeySlot::parse(raw) {
            return Some(StorageKey::Slot(slot));
        }
        raw.strip_prefix(ATTEMPT_DETAIL_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| StorageKey::AttemptDetail(AttemptId::new(id)))
    }
}

impl From<KeySlot> for StorageKey {
    fn from(slot: KeySlot) -> Self {
        StorageKey::Slot(slot)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}
