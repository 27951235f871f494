use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::SqliteInitError;

/// One schema step. Statements run inside a single transaction.
struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "kv_store",
        statements: &[r"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "],
    },
    Migration {
        version: 2,
        name: "kv_store_updated_at",
        statements: &[
            "CREATE INDEX IF NOT EXISTS kv_store_updated_at ON kv_store (updated_at)",
        ],
    },
];

/// Highest version this build knows how to apply.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Highest applied version, or 0 on a fresh database.
pub async fn current_version(pool: &SqlitePool) -> Result<i64, SqliteInitError> {
    let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<i64, _>("version")?)
}

/// Brings the schema up to [`latest_version`]. Already-applied steps are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    let applied = current_version(pool).await?;
    if applied > latest_version() {
        return Err(SqliteInitError::UnknownSchema {
            found: applied,
            supported: latest_version(),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(migration.version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!(version = migration.version, name = migration.name, "applied migration");
    }

    Ok(())
}
