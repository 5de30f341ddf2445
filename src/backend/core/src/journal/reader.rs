//! Read path.

use std::sync::Arc;

use metrics::counter;
use tracing::instrument;

use super::context::CallContext;
use super::model::{RecordedEvent, StreamId};
use crate::error::Result;
use crate::storage::StorageBackend;

/// Reads whole streams in version order.
#[derive(Clone)]
pub struct EventReader {
    backend: Arc<dyn StorageBackend>,
}

impl EventReader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// All committed events of `stream_id`, ascending by version.
    ///
    /// An unknown stream reads as empty.
    #[instrument(skip(self, ctx), fields(backend = self.backend.name()))]
    pub async fn get_stream_events(
        &self,
        ctx: &CallContext,
        stream_id: &str,
    ) -> Result<Vec<RecordedEvent>> {
        let backend = self.backend.name();
        let result = match StreamId::new(stream_id) {
            Ok(stream_id) => ctx
                .run(self.backend.get_stream_events(&stream_id))
                .await
                .map_err(|err| err.with_stream(stream_id.as_str())),
            Err(err) => Err(err),
        };
        counter!("journal_reads_total", "backend" => backend).increment(1);

        match result {
            Ok(mut events) => {
                // ascending by version whatever the backend returned
                events.sort_by_key(|event| event.version);
                counter!("journal_events_read_total", "backend" => backend)
                    .increment(events.len() as u64);
                tracing::debug!(count = events.len(), "Stream read");
                Ok(events)
            }
            Err(err) => {
                err.log();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_empty_stream_id_is_invalid() {
        let reader = EventReader::new(Arc::new(crate::storage::MemoryBackend::new()));
        let err = reader
            .get_stream_events(&CallContext::background(), "")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_empty() {
        let reader = EventReader::new(Arc::new(crate::storage::MemoryBackend::new()));
        let events = reader
            .get_stream_events(&CallContext::background(), "missing")
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_read_names_stream() {
        let reader = EventReader::new(Arc::new(crate::storage::MemoryBackend::new()));
        let ctx = CallContext::background();
        ctx.cancel();

        let err = reader.get_stream_events(&ctx, "s1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
        assert_eq!(err.details().stream_id.as_deref(), Some("s1"));
        assert_eq!(err.details().expected_version, None);
    }
}
