use std::sync::Arc;

use storage::repository::{
    DisconnectedRemote, IdentityProvider, RemoteAttemptStore, StaticIdentity, Storage,
};

use progress_core::model::UserId;

use crate::Clock;
use crate::achievements::AchievementService;
use crate::completion::CompletionTracker;
use crate::config::ProgressConfig;
use crate::counters::CounterStore;
use crate::error::AppServicesError;
use crate::history::HistoryReader;
use crate::journal::AttemptJournal;
use crate::local_attempts::LocalAttemptStore;
use crate::recorder::AttemptRecorder;
use crate::remote::{RestRemoteConfig, RestRemoteStore};
use crate::store::LocalStore;
use crate::wipe::{LocalWriters, WipeCoordinator};

/// Assembles the progress services over one storage bundle.
///
/// Every service shares the same device store and the same per-key locks.
#[derive(Clone)]
pub struct ProgressServices {
    journal: AttemptJournal,
    history: Arc<HistoryReader>,
    recorder: Arc<AttemptRecorder>,
    completion: Arc<CompletionTracker>,
    counters: Arc<CounterStore>,
    achievements: Arc<AchievementService>,
    wipe: Arc<WipeCoordinator>,
}

impl ProgressServices {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, config: ProgressConfig) -> Self {
        let store = LocalStore::new(Arc::clone(&storage.local));
        let local_attempts = LocalAttemptStore::new(store.clone(), config.local_bucket_cap);
        let journal = AttemptJournal::new(store.clone(), config.local_bucket_cap);

        let history = HistoryReader::new(
            local_attempts.clone(),
            journal.clone(),
            Arc::clone(&storage.remote),
            Arc::clone(&storage.identity),
            config,
        );
        let recorder = AttemptRecorder::new(
            local_attempts.clone(),
            Arc::clone(&storage.remote),
            Arc::clone(&storage.identity),
        )
        .with_clock(clock);
        let completion = CompletionTracker::new(store.clone());
        let counters = CounterStore::new(store.clone()).with_clock(clock);
        let achievements = AchievementService::new(
            store.clone(),
            history.clone(),
            completion.clone(),
            counters.clone(),
            config,
        )
        .with_clock(clock);
        let writers = LocalWriters {
            store,
            attempts: local_attempts,
            journal: journal.clone(),
            completion: completion.clone(),
            counters: counters.clone(),
        };
        let wipe = WipeCoordinator::new(
            writers,
            Arc::clone(&storage.remote),
            Arc::clone(&storage.identity),
            config,
        )
        .with_clock(clock);

        Self {
            journal,
            history: Arc::new(history),
            recorder: Arc::new(recorder),
            completion: Arc::new(completion),
            counters: Arc::new(counters),
            achievements: Arc::new(achievements),
            wipe: Arc::new(wipe),
        }
    }

    /// Offline services over an in-memory device store.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(&Storage::in_memory(), clock, ProgressConfig::default())
    }

    /// Services over a `SQLite` device store, with the REST remote when
    /// configured and `user` as the signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated,
    /// or if the remote config is unusable.
    pub async fn sqlite(
        db_url: &str,
        remote: Option<RestRemoteConfig>,
        user: Option<UserId>,
        clock: Clock,
        config: ProgressConfig,
    ) -> Result<Self, AppServicesError> {
        let remote: Arc<dyn RemoteAttemptStore> = match remote {
            Some(remote) => Arc::new(RestRemoteStore::new(remote)?),
            None => Arc::new(DisconnectedRemote),
        };
        let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity::new(user));
        let storage = Storage::sqlite(db_url, remote, identity).await?;
        Ok(Self::new(&storage, clock, config))
    }

    #[must_use]
    pub fn journal(&self) -> AttemptJournal {
        self.journal.clone()
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryReader> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn recorder(&self) -> Arc<AttemptRecorder> {
        Arc::clone(&self.recorder)
    }

    #[must_use]
    pub fn completion(&self) -> Arc<CompletionTracker> {
        Arc::clone(&self.completion)
    }

    #[must_use]
    pub fn counters(&self) -> Arc<CounterStore> {
        Arc::clone(&self.counters)
    }

    #[must_use]
    pub fn achievements(&self) -> Arc<AchievementService> {
        Arc::clone(&self.achievements)
    }

    #[must_use]
    pub fn wipe(&self) -> Arc<WipeCoordinator> {
        Arc::clone(&self.wipe)
    }
}
