use std::fmt;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use progress_core::model::{
    AttemptDraft, AttemptKind, CompletionDomain, ProgressRequest, UserId,
};
use services::{
    ArticleRead, Clock, CompletionChange, ProgressConfig, ProgressServices, RemoteWipe,
    RestRemoteConfig,
};

#[derive(Debug)]
enum ArgsError {
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Parser)]
#[command(name = "progress")]
#[command(about = "Record quiz attempts and inspect achievement progress")]
struct Cli {
    /// SQLite database holding the device store
    #[arg(long = "db", env = "PROGRESS_DB_URL", default_value = "sqlite:progress.sqlite3")]
    db_url: String,

    /// Signed-in user id; omit to run signed out
    #[arg(long, env = "PROGRESS_USER_ID")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a finished attempt
    Record {
        #[arg(long)]
        kind: AttemptKind,
        #[arg(long)]
        category: String,
        #[arg(long)]
        sub_level: String,
        #[arg(long)]
        score: u32,
        #[arg(long)]
        total: u32,
        #[arg(long, default_value_t = 0)]
        time_ms: u64,
        /// Skip the reviewable on-device copy
        #[arg(long)]
        no_journal: bool,
    },
    /// Show merged attempt history
    History {
        #[arg(long)]
        kind: AttemptKind,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Mark a (category, sub-level) pair complete
    Complete {
        #[arg(long)]
        domain: CompletionDomain,
        #[arg(long)]
        category: String,
        #[arg(long)]
        sub_level: String,
    },
    /// Count one share
    Share,
    /// Mark an article as read
    Read { article_id: String },
    /// Print achievement progress
    Progress {
        /// Ignore the remote store for this read
        #[arg(long)]
        local_only: bool,
    },
    /// Delete all progress, locally and remotely
    Wipe,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PROGRESS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let invalid = || ArgsError::InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let path = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(invalid().into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;

    let user = cli
        .user
        .as_deref()
        .map(str::parse::<UserId>)
        .transpose()?;
    let remote = RestRemoteConfig::from_env();
    if remote.is_none() {
        tracing::info!("no remote configured, running offline");
    }
    let services = ProgressServices::sqlite(
        &db_url,
        remote,
        user,
        Clock::default_clock(),
        ProgressConfig::from_env(),
    )
    .await?;

    match cli.command {
        Command::Record {
            kind,
            category,
            sub_level,
            score,
            total,
            time_ms,
            no_journal,
        } => {
            let draft = AttemptDraft::new(kind, category, sub_level, score, total, time_ms);
            let outcome = services.recorder().record(draft).await;
            let record = &outcome.record;

            if !no_journal {
                if let Err(err) = services.journal().save(record).await {
                    tracing::warn!(error = %err, "journal copy not saved");
                }
            }
            if record.is_perfect() {
                services
                    .completion()
                    .mark_complete(CompletionDomain::for_kind(kind), &record.category, &record.sub_level)
                    .await;
            }

            let destination = if outcome.used_fallback { "local fallback" } else { "remote" };
            if outcome.persisted {
                println!("recorded {} ({}) to {destination}", record.id, record.kind);
            } else {
                println!("attempt {} could not be stored", record.id);
            }
        }
        Command::History { kind, limit } => {
            let rows = services.history().get_history(kind, limit).await;
            if rows.is_empty() {
                println!("no attempts");
            }
            for row in rows {
                println!(
                    "{}  {:<12} {:<4} {:>3}/{:<3} {:>6}ms  {}",
                    row.created_at.format("%Y-%m-%d %H:%M"),
                    row.category,
                    row.sub_level,
                    row.score,
                    row.total,
                    row.time_spent_ms,
                    row.id
                );
            }
        }
        Command::Complete {
            domain,
            category,
            sub_level,
        } => {
            let change = services
                .completion()
                .mark_complete(domain, &category, &sub_level)
                .await;
            let count = services.completion().count_completed(domain).await;
            let label = match change {
                CompletionChange::Added => "marked complete",
                CompletionChange::AlreadyComplete => "already complete",
                CompletionChange::NotPersisted => "could not be saved",
            };
            println!(
                "{domain} {category} {sub_level}: {label} ({} sub-levels, {} categories)",
                count.sub_level_count, count.category_count
            );
        }
        Command::Share => {
            let shares = services.counters().increment_share_counter().await;
            println!("shares: {shares}");
        }
        Command::Read { article_id } => {
            let label = match services.counters().mark_article_read(&article_id).await {
                ArticleRead::FirstRead { streak_bumped: true } => "read, streak extended",
                ArticleRead::FirstRead { streak_bumped: false } => "read",
                ArticleRead::AlreadyRead => "already read",
                ArticleRead::NotPersisted => "could not be saved",
            };
            let streak = services.counters().streak().await;
            println!("{article_id}: {label} (streak {})", streak.count);
        }
        Command::Progress { local_only } => {
            let request = if local_only {
                ProgressRequest::local_only()
            } else {
                ProgressRequest::default()
            };
            let progress = services.achievements().compute_progress(request).await;
            for (id, pct) in progress.iter() {
                println!("{id:<12} {pct:>3}%");
            }
            println!("{} of {} unlocked", progress.unlocked(), progress.len());
        }
        Command::Wipe => {
            let report = services.wipe().wipe_all().await;
            match &report.local_error {
                None => println!("local data cleared"),
                Some(err) => println!("local clear incomplete: {err}"),
            }
            match &report.remote {
                RemoteWipe::Deleted(n) => println!("remote rows deleted: {n}"),
                RemoteWipe::Skipped => println!("remote skipped (signed out)"),
                RemoteWipe::Failed(err) => println!("remote delete failed: {err}"),
            }
            println!(
                "progress reads stay local-only until {}",
                report.token.expires_at.format("%H:%M:%S")
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn record_arguments_parse() {
        let cli = Cli::try_parse_from([
            "progress", "record", "--kind", "everydayfirstaid", "--category", "CPR",
            "--sub-level", "Ⅰ", "--score", "4", "--total", "5",
        ])
        .unwrap();
        match cli.command {
            Command::Record { kind, time_ms, .. } => {
                assert_eq!(kind, AttemptKind::FirstAid);
                assert_eq!(time_ms, 0);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:progress.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("progress.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
    }
}
