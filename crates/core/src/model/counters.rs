use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily activity streak. Grows by at most one per calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub count: u32,
    pub last_active: Option<NaiveDate>,
}

impl StreakState {
    /// Records activity on `today`. Returns `true` if the streak grew.
    ///
    /// Missed days do not reset the count.
    pub fn bump(&mut self, today: NaiveDate) -> bool {
        if self.last_active == Some(today) {
            return false;
        }
        self.count = self.count.saturating_add(1);
        self.last_active = Some(today);
        true
    }
}

/// Deduplicated set of opaque article identifiers, in first-read order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadArticleSet(Vec<String>);

impl ReadArticleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id` if absent. Returns `true` on first insertion.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|existing| existing == id)
    }

    /// Number of distinct ids. Duplicates from older writes are collapsed.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Point-in-time view of the scalar counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub shares: u64,
    pub streak: u32,
    pub articles_read: u32,
}
