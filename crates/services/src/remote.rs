//! PostgREST-style client for the remote attempts table.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use progress_core::model::{AttemptKind, AttemptRecord, UserId};
use storage::mapping::decode_attempt_value;
use storage::repository::{AttemptFilter, RemoteAttemptStore, RemoteError};

use crate::error::RestRemoteError;

const DEFAULT_TABLE: &str = "quiz_results";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestRemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
}

impl RestRemoteConfig {
    /// Reads `PROGRESS_REMOTE_URL`, `PROGRESS_REMOTE_KEY` and `PROGRESS_REMOTE_TABLE`.
    ///
    /// Returns `None` unless both the url and the key are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("PROGRESS_REMOTE_URL").ok()?;
        let api_key = env::var("PROGRESS_REMOTE_KEY").ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        let table = env::var("PROGRESS_REMOTE_TABLE")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.into());
        Some(Self {
            base_url,
            api_key,
            table,
        })
    }

    /// # Errors
    ///
    /// Returns `RestRemoteError` if the url or key is blank.
    pub fn validate(&self) -> Result<(), RestRemoteError> {
        if self.base_url.trim().is_empty() {
            return Err(RestRemoteError::EmptyUrl);
        }
        if self.api_key.trim().is_empty() {
            return Err(RestRemoteError::EmptyKey);
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

#[derive(Debug, Serialize)]
struct RemoteRow<'a> {
    id: &'a str,
    user_id: &'a str,
    kind: &'a str,
    category: &'a str,
    sub_level: &'a str,
    score: u32,
    total: u32,
    time_spent_ms: u64,
    created_at: DateTime<Utc>,
}

impl<'a> RemoteRow<'a> {
    fn new(user: &'a UserId, record: &'a AttemptRecord) -> Self {
        Self {
            id: record.id.as_str(),
            user_id: user.as_str(),
            kind: record.kind.as_str(),
            category: &record.category,
            sub_level: &record.sub_level,
            score: record.score,
            total: record.total,
            time_spent_ms: record.time_spent_ms,
            created_at: record.created_at,
        }
    }
}

/// Query parameters selecting the rows of `filter`.
fn filter_params(filter: &AttemptFilter) -> Vec<(&'static str, String)> {
    let mut params = vec![("user_id", format!("eq.{}", filter.user))];
    if !filter.kinds.is_empty() {
        let names: Vec<&str> = filter
            .kinds
            .iter()
            .flat_map(|kind| kind.stored_names().iter().copied())
            .collect();
        params.push(("kind", format!("in.({})", names.join(","))));
    }
    params
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(err.to_string())
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{status}: {}", body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(RemoteError::Unavailable(detail))
    } else {
        Err(RemoteError::Rejected(detail))
    }
}

#[derive(Clone)]
pub struct RestRemoteStore {
    client: Client,
    config: RestRemoteConfig,
}

impl RestRemoteStore {
    /// # Errors
    ///
    /// Returns `RestRemoteError` if the config is blank or the client cannot be built.
    pub fn new(config: RestRemoteConfig) -> Result<Self, RestRemoteError> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }
}

#[async_trait]
impl RemoteAttemptStore for RestRemoteStore {
    async fn insert(&self, user: &UserId, record: &AttemptRecord) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.config.endpoint())
            .header("Prefer", "return=minimal")
            .json(&RemoteRow::new(user, record));
        check(self.authed(request).send().await.map_err(transport)?).await?;
        Ok(())
    }

    async fn delete(&self, filter: &AttemptFilter) -> Result<u64, RemoteError> {
        let request = self
            .client
            .delete(self.config.endpoint())
            .query(&filter_params(filter))
            .header("Prefer", "return=representation");
        let response = check(self.authed(request).send().await.map_err(transport)?).await?;
        let deleted: Vec<Value> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(u64::try_from(deleted.len()).unwrap_or(u64::MAX))
    }

    async fn select(
        &self,
        filter: &AttemptFilter,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, RemoteError> {
        let mut params = filter_params(filter);
        params.push(("select", "*".into()));
        params.push(("order", "created_at.desc".into()));
        params.push(("limit", limit.to_string()));

        let request = self.client.get(self.config.endpoint()).query(&params);
        let response = check(self.authed(request).send().await.map_err(transport)?).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let fallback_kind = filter.kinds.first().copied().unwrap_or(AttemptKind::Disaster);
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_attempt_value(row, fallback_kind) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(error = %err, "skipping undecodable remote row"),
            }
        }
        Ok(records)
    }
}
