//! Achievement catalog and the pure percent calculator.

use std::collections::BTreeMap;

use crate::model::{CompletionCount, CounterSnapshot};

/// Attempts at or under this duration count toward the speed achievement.
pub const SPEED_THRESHOLD_MS: u64 = 20_000;

pub const DISASTER_CATEGORIES: [&str; 8] = [
    "Flood",
    "Earthquake",
    "Typhoon",
    "Lightning",
    "Landslide",
    "Fire",
    "Tsunami",
    "Heatwave",
];

pub const EVERYDAY_CATEGORIES: [&str; 6] = [
    "Bleeding",
    "Burns",
    "Choking",
    "CPR",
    "Fractures",
    "Heatstroke",
];

pub const SUB_LEVELS: [&str; 3] = ["Ⅰ", "Ⅱ", "Ⅲ"];

#[allow(clippy::cast_possible_truncation)]
const fn len_u32(len: usize) -> u32 {
    len as u32
}

pub const DISASTER_CATEGORY_TOTAL: u32 = len_u32(DISASTER_CATEGORIES.len());
pub const EVERYDAY_CATEGORY_TOTAL: u32 = len_u32(EVERYDAY_CATEGORIES.len());
pub const DISASTER_SUB_LEVEL_TOTAL: u32 = DISASTER_CATEGORY_TOTAL * len_u32(SUB_LEVELS.len());
pub const EVERYDAY_SUB_LEVEL_TOTAL: u32 = EVERYDAY_CATEGORY_TOTAL * len_u32(SUB_LEVELS.len());

//
// ─── CATALOG ──────────────────────────────────────────────────────────────────
//

/// Quantity an achievement measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    DisasterSubLevels,
    DisasterCategories,
    EverydaySubLevels,
    EverydayCategories,
    CombinedSubLevels,
    CombinedCategories,
    Shares,
    Streak,
    ArticlesRead,
    PerfectAttempt,
    FastAttempt,
    Attempts,
    FirstAidAttempts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Achievement {
    pub id: &'static str,
    pub metric: Metric,
    pub threshold: u32,
    /// Resolves to exactly 0 or 100.
    pub boolean: bool,
}

const fn ratio(id: &'static str, metric: Metric, threshold: u32) -> Achievement {
    Achievement {
        id,
        metric,
        threshold,
        boolean: false,
    }
}

const fn flag(id: &'static str, metric: Metric) -> Achievement {
    Achievement {
        id,
        metric,
        threshold: 1,
        boolean: true,
    }
}

pub const CATALOG: [Achievement; 40] = [
    ratio("dz_sub_1", Metric::DisasterSubLevels, 1),
    ratio("dz_sub_5", Metric::DisasterSubLevels, 5),
    ratio("dz_sub_10", Metric::DisasterSubLevels, 10),
    ratio("dz_sub_20", Metric::DisasterSubLevels, 20),
    ratio("dz_sub_all", Metric::DisasterSubLevels, DISASTER_SUB_LEVEL_TOTAL),
    ratio("dz_cat_1", Metric::DisasterCategories, 1),
    ratio("dz_cat_3", Metric::DisasterCategories, 3),
    ratio("dz_cat_5", Metric::DisasterCategories, 5),
    ratio("dz_cat_all", Metric::DisasterCategories, DISASTER_CATEGORY_TOTAL),
    ratio("ev_sub_1", Metric::EverydaySubLevels, 1),
    ratio("ev_sub_5", Metric::EverydaySubLevels, 5),
    ratio("ev_sub_10", Metric::EverydaySubLevels, 10),
    ratio("ev_sub_all", Metric::EverydaySubLevels, EVERYDAY_SUB_LEVEL_TOTAL),
    ratio("ev_cat_1", Metric::EverydayCategories, 1),
    ratio("ev_cat_3", Metric::EverydayCategories, 3),
    ratio("ev_cat_all", Metric::EverydayCategories, EVERYDAY_CATEGORY_TOTAL),
    ratio(
        "all_sub_all",
        Metric::CombinedSubLevels,
        DISASTER_SUB_LEVEL_TOTAL + EVERYDAY_SUB_LEVEL_TOTAL,
    ),
    ratio(
        "all_cat_all",
        Metric::CombinedCategories,
        DISASTER_CATEGORY_TOTAL + EVERYDAY_CATEGORY_TOTAL,
    ),
    flag("share1", Metric::Shares),
    ratio("share5", Metric::Shares, 5),
    ratio("share10", Metric::Shares, 10),
    ratio("share30", Metric::Shares, 30),
    ratio("streak3", Metric::Streak, 3),
    ratio("streak7", Metric::Streak, 7),
    ratio("streak14", Metric::Streak, 14),
    ratio("streak30", Metric::Streak, 30),
    ratio("streak100", Metric::Streak, 100),
    flag("read1", Metric::ArticlesRead),
    ratio("read5", Metric::ArticlesRead, 5),
    ratio("read15", Metric::ArticlesRead, 15),
    ratio("read30", Metric::ArticlesRead, 30),
    ratio("read50", Metric::ArticlesRead, 50),
    flag("perfect1", Metric::PerfectAttempt),
    flag("speed20", Metric::FastAttempt),
    flag("quiz1", Metric::Attempts),
    ratio("quiz10", Metric::Attempts, 10),
    ratio("quiz50", Metric::Attempts, 50),
    ratio("quiz100", Metric::Attempts, 100),
    flag("firstaid1", Metric::FirstAidAttempts),
    ratio("firstaid10", Metric::FirstAidAttempts, 10),
];

//
// ─── INPUTS ───────────────────────────────────────────────────────────────────
//

/// Everything the calculator reads, gathered by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressInputs {
    pub disaster: CompletionCount,
    pub everyday: CompletionCount,
    pub counters: CounterSnapshot,
    pub has_perfect_attempt: bool,
    pub has_fast_attempt: bool,
    pub attempts: u32,
    pub first_aid_attempts: u32,
}

impl ProgressInputs {
    #[must_use]
    pub fn value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::DisasterSubLevels => u64::from(self.disaster.sub_level_count),
            Metric::DisasterCategories => u64::from(self.disaster.category_count),
            Metric::EverydaySubLevels => u64::from(self.everyday.sub_level_count),
            Metric::EverydayCategories => u64::from(self.everyday.category_count),
            Metric::CombinedSubLevels => {
                u64::from(self.disaster.sub_level_count) + u64::from(self.everyday.sub_level_count)
            }
            Metric::CombinedCategories => {
                u64::from(self.disaster.category_count) + u64::from(self.everyday.category_count)
            }
            Metric::Shares => self.counters.shares,
            Metric::Streak => u64::from(self.counters.streak),
            Metric::ArticlesRead => u64::from(self.counters.articles_read),
            Metric::PerfectAttempt => u64::from(self.has_perfect_attempt),
            Metric::FastAttempt => u64::from(self.has_fast_attempt),
            Metric::Attempts => u64::from(self.attempts),
            Metric::FirstAidAttempts => u64::from(self.first_aid_attempts),
        }
    }
}

//
// ─── CALCULATION ──────────────────────────────────────────────────────────────
//

/// `round(100 * clamp(value / threshold, 0, 1))`, rounding halves up.
#[must_use]
pub fn percent(value: u64, threshold: u32) -> u8 {
    if threshold == 0 {
        return if value > 0 { 100 } else { 0 };
    }
    let threshold = u64::from(threshold);
    let capped = value.min(threshold);
    let pct = (200 * capped + threshold) / (2 * threshold);
    u8::try_from(pct).unwrap_or(100)
}

/// Percent achieved for every catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AchievementProgress(BTreeMap<&'static str, u8>);

impl AchievementProgress {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<u8> {
        self.0.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        self.0.iter().map(|(id, pct)| (*id, *pct))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn all_zero(&self) -> bool {
        self.0.values().all(|pct| *pct == 0)
    }

    /// Number of achievements at 100%.
    #[must_use]
    pub fn unlocked(&self) -> usize {
        self.0.values().filter(|pct| **pct == 100).count()
    }
}

#[must_use]
pub fn compute_progress(inputs: &ProgressInputs) -> AchievementProgress {
    let map = CATALOG
        .iter()
        .map(|achievement| {
            let value = inputs.value(achievement.metric);
            let pct = if achievement.boolean {
                if value > 0 { 100 } else { 0 }
            } else {
                percent(value, achievement.threshold)
            };
            (achievement.id, pct)
        })
        .collect();
    AchievementProgress(map)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
