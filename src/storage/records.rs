//! Request/response rows and their transactional persistence.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{Error, Result};
use crate::provider::CallParams;

/// Terminal status of a call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ok,
    Error,
}

impl CallStatus {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ok => "ok",
            CallStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `requests` table. Written once per call attempt.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub request_id: String,
    pub ts: String,
    pub provider: String,
    pub model: String,
    pub prompt_hash: String,
    pub prompt_len: u32,
    pub params: CallParams,
    pub latency_ms: f64,
    pub status: CallStatus,
    pub error_msg: Option<String>,
}

impl RequestRecord {
    /// Insert this row using an open connection or transaction.
    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        let params = serde_json::to_string(&self.params)?;
        sqlx::query(
            "INSERT INTO requests (
                request_id, ts, provider, model, prompt_hash, prompt_len,
                params, latency_ms, status, error_msg
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.request_id)
        .bind(&self.ts)
        .bind(&self.provider)
        .bind(&self.model)
        .bind(&self.prompt_hash)
        .bind(self.prompt_len as i64)
        .bind(params)
        .bind(self.latency_ms)
        .bind(self.status.as_str())
        .bind(self.error_msg.as_deref())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// One row of the `responses` table. Exists only for `ok` requests.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub request_id: String,
    pub response_text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub quality_proxy: f64,
}

impl ResponseRecord {
    /// Insert this row using an open connection or transaction.
    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO responses (
                request_id, response_text, usage_tokens_in, usage_tokens_out,
                cost_usd, quality_proxy
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.request_id)
        .bind(&self.response_text)
        .bind(self.tokens_in as i64)
        .bind(self.tokens_out as i64)
        .bind(self.cost_usd)
        .bind(self.quality_proxy)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Write a request and its optional response in one transaction.
///
/// A response must be supplied exactly when the request status is `ok`.
/// On any failure the transaction is rolled back and no rows remain.
pub async fn persist_call(
    pool: &SqlitePool,
    request: &RequestRecord,
    response: Option<&ResponseRecord>,
) -> Result<()> {
    let expects_response = request.status == CallStatus::Ok;
    if expects_response != response.is_some() {
        return Err(Error::Internal(format!(
            "request {} has status '{}' but response row present = {}",
            request.request_id,
            request.status,
            response.is_some()
        )));
    }

    let mut tx = pool.begin().await?;
    request.insert(&mut *tx).await?;
    if let Some(response) = response {
        response.insert(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::debug!(
        request_id = %request.request_id,
        status = %request.status,
        "Persisted call"
    );
    Ok(())
}

/// A request joined with its response, if any.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RecentCall {
    pub request_id: String,
    pub ts: String,
    pub provider: String,
    pub model: String,
    pub prompt_len: i64,
    pub latency_ms: f64,
    pub status: String,
    pub error_msg: Option<String>,
    pub usage_tokens_in: Option<i64>,
    pub usage_tokens_out: Option<i64>,
    pub cost_usd: Option<f64>,
    pub quality_proxy: Option<f64>,
}

/// Most recent calls, newest first.
pub async fn recent_calls(pool: &SqlitePool, limit: u32) -> Result<Vec<RecentCall>> {
    let rows = sqlx::query_as::<_, RecentCall>(
        "SELECT r.request_id, r.ts, r.provider, r.model, r.prompt_len, r.latency_ms, \
         r.status, r.error_msg, s.usage_tokens_in, s.usage_tokens_out, s.cost_usd, \
         s.quality_proxy \
         FROM requests r LEFT JOIN responses s ON r.request_id = s.request_id \
         ORDER BY r.ts DESC, r.request_id DESC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Look up a single call by request id.
pub async fn find_call(pool: &SqlitePool, request_id: &str) -> Result<Option<RecentCall>> {
    let row = sqlx::query_as::<_, RecentCall>(
        "SELECT r.request_id, r.ts, r.provider, r.model, r.prompt_len, r.latency_ms, \
         r.status, r.error_msg, s.usage_tokens_in, s.usage_tokens_out, s.cost_usd, \
         s.quality_proxy \
         FROM requests r LEFT JOIN responses s ON r.request_id = s.request_id \
         WHERE r.request_id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Number of rows in `requests` and `responses`.
pub async fn row_counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let (requests,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
        .fetch_one(pool)
        .await?;
    let (responses,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM responses")
        .fetch_one(pool)
        .await?;
    Ok((requests, responses))
}
