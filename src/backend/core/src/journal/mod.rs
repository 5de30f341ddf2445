//! The journal core.
//!
//! [`Journal`] composes the write path ([`StreamAppender`]) and the read path
//! ([`EventReader`]) over one [`StorageBackend`]. Every operation takes a
//! [`CallContext`] so callers control cancellation and deadlines.

pub mod appender;
pub mod clock;
pub mod context;
pub mod model;
pub mod reader;

use std::sync::Arc;

pub use appender::StreamAppender;
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::CallContext;
pub use model::{AppendRequest, NewEvent, PendingEvent, RecordedEvent, StreamId};
pub use reader::EventReader;

use crate::error::Result;
use crate::storage::StorageBackend;

/// Append-only, per-stream versioned event journal.
#[derive(Clone)]
pub struct Journal {
    backend: Arc<dyn StorageBackend>,
    appender: StreamAppender,
    reader: EventReader,
}

impl Journal {
    /// A journal over `backend`, timestamped by the system clock.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            appender: StreamAppender::new(backend.clone(), clock),
            reader: EventReader::new(backend.clone()),
            backend,
        }
    }

    /// Append one event under the expected-version protocol.
    ///
    /// `expected_version == 0` creates the stream. Returns the assigned version.
    pub async fn append(&self, ctx: &CallContext, request: AppendRequest) -> Result<i64> {
        self.appender.append(ctx, request).await
    }

    /// All events of a stream in ascending version order.
    pub async fn get_stream_events(
        &self,
        ctx: &CallContext,
        stream_id: &str,
    ) -> Result<Vec<RecordedEvent>> {
        self.reader.get_stream_events(ctx, stream_id).await
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}
