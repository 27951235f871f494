use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::attempt::{AttemptError, AttemptKind};

/// The two mastery domains tracked by completion sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionDomain {
    Disaster,
    Everyday,
}

impl CompletionDomain {
    pub const ALL: [CompletionDomain; 2] = [CompletionDomain::Disaster, CompletionDomain::Everyday];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionDomain::Disaster => "disaster",
            CompletionDomain::Everyday => "everyday",
        }
    }

    /// Domain an attempt kind contributes mastery to.
    #[must_use]
    pub fn for_kind(kind: AttemptKind) -> Self {
        match kind {
            AttemptKind::Disaster => CompletionDomain::Disaster,
            AttemptKind::FirstAid => CompletionDomain::Everyday,
        }
    }
}

impl fmt::Display for CompletionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionDomain {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disaster" => Ok(CompletionDomain::Disaster),
            "everyday" => Ok(CompletionDomain::Everyday),
            other => Err(AttemptError::UnknownDomain(other.to_string())),
        }
    }
}

/// Completed counts for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionCount {
    /// Completed (category, sub-level) pairs.
    pub sub_level_count: u32,
    /// Categories with at least one completed sub-level.
    pub category_count: u32,
}

/// Append-only `category -> sub-level -> true` map for one domain.
///
/// Stored values other than `true` are tolerated on read and ignored by counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionSet(BTreeMap<String, BTreeMap<String, bool>>);

impl CompletionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a pair complete. Returns `true` if it was not complete before.
    pub fn mark(&mut self, category: &str, sub_level: &str) -> bool {
        let levels = self.0.entry(category.to_string()).or_default();
        let slot = levels.entry(sub_level.to_string()).or_insert(false);
        let newly = !*slot;
        *slot = true;
        newly
    }

    #[must_use]
    pub fn is_complete(&self, category: &str, sub_level: &str) -> bool {
        self.0
            .get(category)
            .and_then(|levels| levels.get(sub_level))
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn count(&self) -> CompletionCount {
        let mut count = CompletionCount::default();
        for levels in self.0.values() {
            let done = levels.values().filter(|done| **done).count();
            if done > 0 {
                count.category_count += 1;
                count.sub_level_count += u32::try_from(done).unwrap_or(u32::MAX);
            }
        }
        count
    }
}
