#![forbid(unsafe_code)]

pub mod achievements;
pub mod app_services;
pub mod completion;
pub mod config;
pub mod counters;
pub mod error;
pub mod history;
pub mod journal;
pub mod local_attempts;
pub mod recorder;
pub mod remote;
pub mod store;
pub mod wipe;

pub use progress_core::Clock;

pub use achievements::AchievementService;
pub use app_services::ProgressServices;
pub use completion::{CompletionChange, CompletionTracker};
pub use config::ProgressConfig;
pub use counters::{ArticleRead, CounterStore, StreakBump};
pub use error::{AppServicesError, ProgressServiceError, RestRemoteError};
pub use history::HistoryReader;
pub use journal::{AttemptJournal, JournalEntry};
pub use local_attempts::LocalAttemptStore;
pub use recorder::{AttemptRecorder, RecordOutcome};
pub use remote::{RestRemoteConfig, RestRemoteStore};
pub use store::LocalStore;
pub use wipe::{LocalWriters, RemoteWipe, WipeCoordinator, WipeReport};
