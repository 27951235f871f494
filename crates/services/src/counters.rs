use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, MutexGuard};

use progress_core::model::{CounterSnapshot, KeySlot, ReadArticleSet, StorageKey, StreakState};
use progress_core::time::Clock;
use storage::repository::StorageError;

use crate::store::LocalStore;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Result of `CounterStore::mark_article_read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleRead {
    FirstRead { streak_bumped: bool },
    AlreadyRead,
    NotPersisted,
}

/// Result of `CounterStore::bump_streak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakBump {
    Bumped(u32),
    AlreadyToday(u32),
    NotPersisted,
}

fn key(slot: KeySlot) -> StorageKey {
    slot.into()
}

/// Share counter, read-article set and daily streak.
///
/// Every mutation runs under one lock, so concurrent increments never lose updates.
#[derive(Clone)]
pub struct CounterStore {
    clock: Clock,
    store: LocalStore,
    lock: Arc<Mutex<()>>,
}

impl CounterStore {
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self {
            clock: Clock::default(),
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Add one share. Returns the count now observed in storage.
    pub async fn increment_share_counter(&self) -> u64 {
        let _guard = self.lock.lock().await;
        let previous = self.read_shares().await;
        let shares = previous.saturating_add(1);
        match self.store.write_json(&key(KeySlot::Shares), &shares).await {
            Ok(()) => shares,
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist share counter");
                previous
            }
        }
    }

    /// Record an article as read; only the first read of an id bumps the streak.
    pub async fn mark_article_read(&self, article_id: &str) -> ArticleRead {
        let _guard = self.lock.lock().await;

        let mut read: ReadArticleSet = self.store.read_json(&key(KeySlot::ReadIds)).await;
        if !read.insert(article_id) {
            return ArticleRead::AlreadyRead;
        }
        if let Err(err) = self.store.write_json(&key(KeySlot::ReadIds), &read).await {
            tracing::warn!(article_id, error = %err, "failed to persist read articles");
            return ArticleRead::NotPersisted;
        }
        let streak_bumped = matches!(self.bump_streak_unlocked().await, StreakBump::Bumped(_));
        ArticleRead::FirstRead { streak_bumped }
    }

    /// Grow the streak by one unless it already grew today.
    pub async fn bump_streak(&self) -> StreakBump {
        let _guard = self.lock.lock().await;
        self.bump_streak_unlocked().await
    }

    pub async fn share_count(&self) -> u64 {
        self.read_shares().await
    }

    pub async fn streak(&self) -> StreakState {
        self.read_streak().await
    }

    pub async fn read_count(&self) -> u32 {
        let read: ReadArticleSet = self.store.read_json(&key(KeySlot::ReadIds)).await;
        u32::try_from(read.len()).unwrap_or(u32::MAX)
    }

    pub async fn snapshot(&self) -> CounterSnapshot {
        let _guard = self.lock.lock().await;
        CounterSnapshot {
            shares: self.read_shares().await,
            streak: self.read_streak().await.count,
            articles_read: self.read_count().await,
        }
    }

    /// Holds off every counter mutation until the guard drops.
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    async fn bump_streak_unlocked(&self) -> StreakBump {
        let previous = self.read_streak().await;
        let mut streak = previous;
        if !streak.bump(self.clock.today()) {
            return StreakBump::AlreadyToday(streak.count);
        }
        match self.write_streak(previous, streak).await {
            Ok(()) => StreakBump::Bumped(streak.count),
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist streak");
                StreakBump::NotPersisted
            }
        }
    }

    async fn read_shares(&self) -> u64 {
        self.store.read_json(&key(KeySlot::Shares)).await
    }

    async fn read_streak(&self) -> StreakState {
        let count = self.store.read_json(&key(KeySlot::StreakCount)).await;
        let last_active = self
            .store
            .read_raw(&key(KeySlot::StreakLastActive))
            .await
            .and_then(|raw| parse_day(&raw));
        StreakState { count, last_active }
    }

    /// Day first, then count. A failed count write puts the previous day
    /// back, so a retry on the same day still bumps.
    async fn write_streak(
        &self,
        previous: StreakState,
        next: StreakState,
    ) -> Result<(), StorageError> {
        let day_key = key(KeySlot::StreakLastActive);
        if let Some(day) = next.last_active {
            self.store.write_json(&day_key, &format_day(day)).await?;
        }
        if let Err(err) = self
            .store
            .write_json(&key(KeySlot::StreakCount), &next.count)
            .await
        {
            let restored = match previous.last_active {
                Some(day) => self.store.write_json(&day_key, &format_day(day)).await,
                None => self.store.remove(&day_key).await,
            };
            if let Err(restore_err) = restored {
                tracing::warn!(error = %restore_err, "failed to restore streak date");
            }
            return Err(err);
        }
        Ok(())
    }
}

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Accepts a JSON string or bare `YYYY-MM-DD` text.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim().trim_matches('"');
    NaiveDate::parse_from_str(text, DAY_FORMAT)
        .inspect_err(|err| tracing::warn!(raw, error = %err, "unreadable streak date"))
        .ok()
}
