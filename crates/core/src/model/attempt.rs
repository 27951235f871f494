use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::AttemptId;
use crate::time::calendar_day;

/// Maximum number of rows retained per local attempt bucket.
pub const LOCAL_BUCKET_CAP: usize = 200;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("unknown attempt kind: {0}")]
    UnknownKind(String),

    #[error("unknown completion domain: {0}")]
    UnknownDomain(String),
}

//
// ─── ATTEMPT KIND ─────────────────────────────────────────────────────────────
//

/// The activity family an attempt belongs to.
///
/// `firstaid` was previously stored as `everydayfirstaid`; both spellings
/// parse to [`AttemptKind::FirstAid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    Disaster,
    #[serde(alias = "everydayfirstaid")]
    FirstAid,
}

impl AttemptKind {
    pub const ALL: [AttemptKind; 2] = [AttemptKind::Disaster, AttemptKind::FirstAid];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptKind::Disaster => "disaster",
            AttemptKind::FirstAid => "firstaid",
        }
    }

    /// Every spelling this kind has been persisted under remotely.
    #[must_use]
    pub fn stored_names(self) -> &'static [&'static str] {
        match self {
            AttemptKind::Disaster => &["disaster"],
            AttemptKind::FirstAid => &["firstaid", "everydayfirstaid"],
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptKind {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disaster" => Ok(AttemptKind::Disaster),
            "firstaid" | "everydayfirstaid" => Ok(AttemptKind::FirstAid),
            other => Err(AttemptError::UnknownKind(other.to_string())),
        }
    }
}

//
// ─── ATTEMPT RECORD ───────────────────────────────────────────────────────────
//

/// One completed, scored activity attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub kind: AttemptKind,
    pub category: String,
    pub sub_level: String,
    pub score: u32,
    pub total: u32,
    pub time_spent_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// An attempt where every question was answered correctly.
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.score == self.total
    }

    #[must_use]
    pub fn day(&self) -> NaiveDate {
        calendar_day(self.created_at)
    }

    /// Reconciliation key: one logical attempt per activity per calendar day.
    #[must_use]
    pub fn key(&self) -> AttemptKey {
        AttemptKey {
            kind: self.kind,
            category: self.category.clone(),
            sub_level: self.sub_level.clone(),
            day: self.day(),
        }
    }
}

/// Identity of a logical attempt, independent of which store issued its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub kind: AttemptKind,
    pub category: String,
    pub sub_level: String,
    pub day: NaiveDate,
}

/// Caller input for a finished activity, before an id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDraft {
    pub kind: AttemptKind,
    pub category: String,
    pub sub_level: String,
    pub score: u32,
    pub total: u32,
    pub time_spent_ms: u64,
}

impl AttemptDraft {
    #[must_use]
    pub fn new(
        kind: AttemptKind,
        category: impl Into<String>,
        sub_level: impl Into<String>,
        score: u32,
        total: u32,
        time_spent_ms: u64,
    ) -> Self {
        Self {
            kind,
            category: category.into(),
            sub_level: sub_level.into(),
            score,
            total,
            time_spent_ms,
        }
    }

    /// Assigns identity and time. The score is clamped to the total.
    #[must_use]
    pub fn into_record(self, id: AttemptId, created_at: DateTime<Utc>) -> AttemptRecord {
        AttemptRecord {
            id,
            kind: self.kind,
            category: self.category.trim().to_string(),
            sub_level: self.sub_level.trim().to_string(),
            score: self.score.min(self.total),
            total: self.total,
            time_spent_ms: self.time_spent_ms,
            created_at,
        }
    }
}

//
// ─── ATTEMPT INDEX ────────────────────────────────────────────────────────────
//

/// Lightweight listing entry pointing at an `attempt:<id>` detail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptIndexEntry {
    pub id: AttemptId,
    pub kind: AttemptKind,
    pub category: String,
    pub sub_level: String,
    pub score: u32,
    pub total: u32,
    pub created_at: DateTime<Utc>,
}

impl AttemptIndexEntry {
    #[must_use]
    pub fn from_record(record: &AttemptRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            category: record.category.clone(),
            sub_level: record.sub_level.clone(),
            score: record.score,
            total: record.total,
            created_at: record.created_at,
        }
    }

    /// Whether `record` is a valid detail for this entry.
    #[must_use]
    pub fn resolves_to(&self, record: &AttemptRecord) -> bool {
        self.id == record.id && self.kind == record.kind
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
