//! Write path: validation, timestamping and the optimistic-concurrency append.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::instrument;

use super::clock::Clock;
use super::context::CallContext;
use super::model::{AppendRequest, PendingEvent, StreamId};
use crate::error::{JournalError, Result};
use crate::storage::StorageBackend;

/// Validates appends and hands them to the backend's atomic write.
///
/// Holds no stream state between calls. The backend's conditional write
/// decides which of two racing appends wins.
#[derive(Clone)]
pub struct StreamAppender {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl StreamAppender {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Check preconditions and stamp the commit time.
    pub fn prepare(&self, request: AppendRequest) -> Result<PendingEvent> {
        let stream_id = StreamId::new(request.stream_id)?;
        if request.expected_version < 0 {
            return Err(JournalError::invalid_argument(format!(
                "expected_version must be >= 0, got {}",
                request.expected_version
            ))
            .with_stream(stream_id.as_str()));
        }

        Ok(PendingEvent {
            stream_id,
            expected_version: request.expected_version,
            event: request.event,
            recorded_at: self.clock.now(),
        })
    }

    /// Append one event. Returns the version assigned to it.
    #[instrument(
        skip(self, ctx, request),
        fields(
            stream_id = %request.stream_id,
            expected_version = request.expected_version,
            backend = self.backend.name()
        )
    )]
    pub async fn append(&self, ctx: &CallContext, request: AppendRequest) -> Result<i64> {
        let backend = self.backend.name();
        let pending = match self.prepare(request) {
            Ok(pending) => pending,
            Err(err) => {
                counter!("journal_appends_total", "backend" => backend, "outcome" => err.code().as_str())
                    .increment(1);
                return Err(err);
            }
        };

        let started = Instant::now();
        let result = ctx
            .run(self.backend.append_event(&pending))
            .await
            .map_err(|err| {
                err.with_stream(pending.stream_id.as_str())
                    .with_expected_version(pending.expected_version)
            });
        histogram!("journal_append_duration_seconds", "backend" => backend)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(version) => {
                counter!("journal_appends_total", "backend" => backend, "outcome" => "ok")
                    .increment(1);
                tracing::debug!(version, "Append committed");
            }
            Err(err) => {
                counter!("journal_appends_total", "backend" => backend, "outcome" => err.code().as_str())
                    .increment(1);
                err.log();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::journal::clock::FixedClock;
    use crate::journal::model::NewEvent;
    use crate::storage::MemoryBackend;
    use chrono::{TimeZone, Utc};

    fn appender() -> StreamAppender {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        StreamAppender::new(Arc::new(MemoryBackend::new()), Arc::new(FixedClock(at)))
    }

    #[test]
    fn test_prepare_stamps_clock_time() {
        let pending = appender()
            .prepare(AppendRequest::new("s1", 0, NewEvent::new("k")))
            .unwrap();
        assert_eq!(pending.recorded_at, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(pending.next_version(), 1);
    }

    #[test]
    fn test_prepare_rejects_negative_expected_version() {
        let err = appender()
            .prepare(AppendRequest::new("s1", -1, NewEvent::new("k")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.details().stream_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_empty_stream_rejected_before_backend() {
        let appender = appender();
        let err = appender
            .append(&CallContext::background(), AppendRequest::new("", 0, NewEvent::new("k")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_cancelled_context_never_reaches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let appender = StreamAppender::new(backend.clone(), Arc::new(FixedClock(Utc::now())));
        let ctx = CallContext::background();
        ctx.cancel();

        let err = appender
            .append(&ctx, AppendRequest::new("s1", 0, NewEvent::new("k")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
        assert_eq!(err.details().stream_id.as_deref(), Some("s1"));
        assert_eq!(err.details().expected_version, Some(0));
        assert_eq!(backend.stream_count(), 0);
    }
}
