//! In-process journal backend.
//!
//! Streams live in a sharded map. An append holds the stream's entry lock
//! for the whole check-bump-push sequence and never awaits while holding it,
//! so the sequence is atomic and appends to other shards run in parallel.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::StorageBackend;
use crate::error::{JournalError, Result};
use crate::journal::model::{truncate_to_micros, PendingEvent, RecordedEvent, StreamId};

/// Journal backend that keeps every stream in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    streams: DashMap<StreamId, Vec<RecordedEvent>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams created so far.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn record(event: &PendingEvent, version: i64) -> RecordedEvent {
        RecordedEvent {
            id: Some(Uuid::new_v4().to_string()),
            stream_id: event.stream_id.to_string(),
            version,
            kind: event.event.kind.clone(),
            encoding: event.event.encoding.clone(),
            source: event.event.source.clone(),
            payload: event.event.payload.clone(),
            recorded_at: truncate_to_micros(event.recorded_at),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn append_event(&self, event: &PendingEvent) -> Result<i64> {
        let expected = event.expected_version;

        match self.streams.entry(event.stream_id.clone()) {
            Entry::Vacant(vacant) => {
                if expected != 0 {
                    return Err(JournalError::version_conflict(
                        event.stream_id.as_str(),
                        expected,
                        Some(0),
                    ));
                }
                vacant.insert(vec![Self::record(event, 1)]);
                Ok(1)
            }
            Entry::Occupied(mut occupied) => {
                let actual = occupied.get().len() as i64;
                if actual != expected {
                    return Err(JournalError::version_conflict(
                        event.stream_id.as_str(),
                        expected,
                        Some(actual),
                    ));
                }
                let version = event.next_version();
                occupied.get_mut().push(Self::record(event, version));
                Ok(version)
            }
        }
    }

    async fn get_stream_events(&self, stream_id: &StreamId) -> Result<Vec<RecordedEvent>> {
        Ok(self
            .streams
            .get(stream_id)
            .map(|events| events.value().clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
