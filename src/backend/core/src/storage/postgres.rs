//! PostgreSQL journal backend.
//!
//! The append is one client transaction around a single call to the
//! `append_event` server-side function (see `schema/postgres.sql`), which
//! performs the conditional stream update and the event insert together.
//! The transaction is committed only after the function returns; dropping
//! the future earlier rolls it back.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgDatabaseError, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::instrument;

use super::StorageBackend;
use crate::config::DatabaseConfig;
use crate::error::{ErrorCode, JournalError, Result};
use crate::journal::model::{truncate_to_micros, PendingEvent, RecordedEvent, StreamId};

/// Tables, unique constraint and the `append_event` function.
pub const SCHEMA: &str = include_str!("../../schema/postgres.sql");

/// Raised by `append_event` when the stream is not at the expected version.
const SQLSTATE_VERSION_CONFLICT: &str = "EJ409";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Journal backend on a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Open a pool from configuration, installing the schema if asked to.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.require_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(url)
            .await
            .map_err(|e| classify(e, None))?;

        let backend = Self::new(pool);
        if config.ensure_schema {
            backend.ensure_schema().await?;
        }
        Ok(backend)
    }

    /// Wrap an already-initialized pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and (re)define `append_event`. Idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool
            .execute(SCHEMA)
            .await
            .map_err(|e| classify(e, None))?;
        tracing::info!("PostgreSQL journal schema ensured");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    #[instrument(
        skip(self, event),
        fields(stream_id = %event.stream_id, expected_version = event.expected_version)
    )]
    async fn append_event(&self, event: &PendingEvent) -> Result<i64> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(|e| classify(e, Some(event)))?;

        let version: i64 = sqlx::query_scalar(
            "SELECT append_event($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.stream_id.as_str())
        .bind(event.expected_version)
        .bind(&event.event.kind)
        .bind(&event.event.encoding)
        .bind(&event.event.source)
        .bind(&event.event.payload)
        .bind(truncate_to_micros(event.recorded_at))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, Some(event)))?;

        tx.commit().await.map_err(|e| classify(e, Some(event)))?;

        tracing::debug!(
            version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Event appended"
        );
        Ok(version)
    }

    #[instrument(skip(self), fields(stream_id = %stream_id))]
    async fn get_stream_events(&self, stream_id: &StreamId) -> Result<Vec<RecordedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, stream_id, version, kind, encoding, source, payload, recorded_at
            FROM events
            WHERE stream_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(stream_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, None).with_stream(stream_id.as_str()))?;

        Ok(rows.into_iter().map(RecordedEvent::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, None))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    stream_id: String,
    version: i64,
    kind: String,
    encoding: String,
    source: String,
    payload: Vec<u8>,
    recorded_at: DateTime<Utc>,
}

impl From<EventRow> for RecordedEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: Some(row.id.to_string()),
            stream_id: row.stream_id,
            version: row.version,
            kind: row.kind,
            encoding: row.encoding,
            source: row.source,
            payload: row.payload,
            recorded_at: row.recorded_at,
        }
    }
}

/// Map a sqlx error onto the canonical error kinds.
fn classify(error: sqlx::Error, append: Option<&PendingEvent>) -> JournalError {
    let code = match &error {
        sqlx::Error::Database(db_err) => {
            let sqlstate = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let detail = db_err
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.detail());

            if let Some(event) = append {
                if let Some(actual) = conflict_from_sqlstate(&sqlstate, detail) {
                    return JournalError::version_conflict(
                        event.stream_id.as_str(),
                        event.expected_version,
                        actual,
                    )
                    .with_source(error);
                }
            }
            code_for_sqlstate(&sqlstate)
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => ErrorCode::Unavailable,
        _ => ErrorCode::Internal,
    };

    let journal_error = match code {
        ErrorCode::Unavailable => JournalError::unavailable(error.to_string()),
        _ => JournalError::internal(error.to_string()),
    };
    let journal_error = match append {
        Some(event) => journal_error.with_stream(event.stream_id.as_str()),
        None => journal_error,
    };
    journal_error.with_source(error)
}

/// `Some(actual)` when the SQLSTATE signals a lost version race.
///
/// The outer option says "is a conflict"; the inner one carries the current
/// version when the server reported it.
fn conflict_from_sqlstate(sqlstate: &str, detail: Option<&str>) -> Option<Option<i64>> {
    match sqlstate {
        SQLSTATE_VERSION_CONFLICT => Some(detail.and_then(|d| d.trim().parse().ok())),
        SQLSTATE_UNIQUE_VIOLATION => Some(None),
        _ => None,
    }
}

/// Non-conflict SQLSTATEs: connection-level and resource classes are
/// transient, everything else is internal.
fn code_for_sqlstate(sqlstate: &str) -> ErrorCode {
    match sqlstate.get(..2) {
        // connection exception, insufficient resources, operator intervention
        Some("08") | Some("53") | Some("57") => ErrorCode::Unavailable,
        // serialization failure, deadlock detected
        Some("40") => ErrorCode::Unavailable,
        _ => ErrorCode::Internal,
    }
}
