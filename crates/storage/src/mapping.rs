//! JSON encoding for values held in the key-value store.
//!
//! Attempt rows written by older app versions used different field names and,
//! in the oldest builds, a bare pass/fail flag instead of a score. Everything
//! is normalised into `AttemptRecord` on read.

use chrono::{DateTime, Utc};
use progress_core::model::{AttemptId, AttemptKind, AttemptRecord};
use progress_core::time::from_epoch_millis;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Decode a stored JSON value.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the text is not valid for `T`.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if `value` cannot be represented as JSON.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

//
// ─── LEGACY ROW SHAPES ────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Textish {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Textish {
    fn into_string(self) -> String {
        match self {
            Textish::Text(s) => s,
            Textish::Integer(n) => n.to_string(),
            Textish::Float(f) => f.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

impl StoredTimestamp {
    #[allow(clippy::cast_possible_truncation)]
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            StoredTimestamp::Millis(ms) => from_epoch_millis(ms),
            StoredTimestamp::FractionalMillis(ms) => from_epoch_millis(ms as i64),
            StoredTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|at| at.with_timezone(&Utc))
                .ok()
                .or_else(|| text.trim().parse::<i64>().ok().and_then(from_epoch_millis)),
        }
    }
}

/// Every field name an attempt row has been written with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAttemptRow {
    #[serde(default)]
    id: Option<Textish>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    category: Option<Textish>,
    #[serde(default, alias = "sub_level", alias = "level")]
    sub_level: Option<Textish>,
    #[serde(default, alias = "correct")]
    score: Option<f64>,
    #[serde(default, alias = "questions", alias = "count")]
    total: Option<f64>,
    #[serde(default, alias = "time_spent_ms", alias = "durationMs", alias = "time")]
    time_spent_ms: Option<f64>,
    #[serde(default, alias = "created_at", alias = "timestamp", alias = "date")]
    created_at: Option<StoredTimestamp>,
    #[serde(default, alias = "passed")]
    completed: Option<bool>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_u32(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_u64(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

impl StoredAttemptRow {
    /// Normalise into the canonical record. `fallback_kind` applies when the
    /// row carries no (or an unknown) kind of its own.
    fn into_record(self, fallback_kind: AttemptKind) -> Result<AttemptRecord, StorageError> {
        let category = self
            .category
            .map(Textish::into_string)
            .ok_or_else(|| ser("attempt row missing category"))?;
        let sub_level = self
            .sub_level
            .map(Textish::into_string)
            .ok_or_else(|| ser("attempt row missing subLevel"))?;
        let kind = self
            .kind
            .and_then(|raw| raw.parse::<AttemptKind>().ok())
            .unwrap_or(fallback_kind);

        let (score, total) = match (self.score, self.total, self.completed) {
            (None, None, Some(done)) => (u32::from(done), 1),
            (score, total, _) => {
                let score = score.map_or(0, whole_u32);
                // An unknown total never makes a row perfect.
                let total = total.map_or(0, whole_u32);
                (score.min(total), total)
            }
        };

        let created_at = match self.created_at {
            Some(stamp) => stamp
                .resolve()
                .ok_or_else(|| ser("attempt row has unreadable timestamp"))?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        let id = self.id.map(Textish::into_string).unwrap_or_else(|| {
            format!(
                "legacy-{kind}-{category}-{sub_level}-{}",
                created_at.timestamp_millis()
            )
        });

        Ok(AttemptRecord {
            id: AttemptId::new(id),
            kind,
            category,
            sub_level,
            score,
            total,
            time_spent_ms: self.time_spent_ms.map_or(0, whole_u64),
            created_at,
        })
    }
}

/// Decode a single attempt row in any historical shape.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if required fields are missing or unreadable.
pub fn decode_attempt_value(value: Value, fallback_kind: AttemptKind) -> Result<AttemptRecord, StorageError> {
    let row: StoredAttemptRow = serde_json::from_value(value).map_err(ser)?;
    row.into_record(fallback_kind)
}

/// Decode a single attempt row from stored text.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the text is not an attempt row.
pub fn decode_attempt(raw: &str, fallback_kind: AttemptKind) -> Result<AttemptRecord, StorageError> {
    let value: Value = decode_json(raw)?;
    decode_attempt_value(value, fallback_kind)
}

/// Decode a bucket of attempt rows. Unreadable rows are skipped individually.
///
/// Rows are forced to `kind`, since a bucket only ever holds one logical kind.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value is not a JSON array.
pub fn decode_attempt_rows(raw: &str, kind: AttemptKind) -> Result<Vec<AttemptRecord>, StorageError> {
    let values: Vec<Value> = decode_json(raw)?;
    let mut rows = Vec::with_capacity(values.len());
    for value in values {
        match decode_attempt_value(value, kind) {
            Ok(mut record) => {
                record.kind = kind;
                rows.push(record);
            }
            Err(err) => tracing::warn!(%kind, error = %err, "skipping unreadable attempt row"),
        }
    }
    Ok(rows)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
