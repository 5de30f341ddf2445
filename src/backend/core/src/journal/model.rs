//! Journal domain types.
//!
//! These are the only shapes that cross the storage boundary: the gRPC layer
//! converts to and from them, and every backend produces and consumes them.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

// =============================================================================
// Stream IDs
// =============================================================================

/// Identifier of a stream. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Validate and wrap a stream identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(JournalError::invalid_argument("stream_id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StreamId {
    type Error = JournalError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Appends
// =============================================================================

/// The caller-supplied part of an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event type tag
    pub kind: String,
    /// Payload format tag
    pub encoding: String,
    /// Producer identifier
    pub source: String,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl NewEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// An append as received from a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub stream_id: String,
    /// 0 creates the stream; N > 0 requires the stream to be at N.
    pub expected_version: i64,
    pub event: NewEvent,
}

impl AppendRequest {
    pub fn new(stream_id: impl Into<String>, expected_version: i64, event: NewEvent) -> Self {
        Self {
            stream_id: stream_id.into(),
            expected_version,
            event,
        }
    }
}

/// A validated append, timestamped and ready for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub stream_id: StreamId,
    pub expected_version: i64,
    pub event: NewEvent,
    pub recorded_at: DateTime<Utc>,
}

impl PendingEvent {
    /// The version this append assigns if it commits.
    pub fn next_version(&self) -> i64 {
        self.expected_version + 1
    }
}

// =============================================================================
// Reads
// =============================================================================

/// An event as committed to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Backend-assigned identifier
    pub id: Option<String>,
    pub stream_id: String,
    pub version: i64,
    pub kind: String,
    pub encoding: String,
    pub source: String,
    pub payload: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Wire rendering of the commit time.
    pub fn timestamp(&self) -> String {
        format_timestamp(self.recorded_at)
    }
}

/// RFC 3339, UTC, microsecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncate to the microsecond resolution every backend can store.
pub fn truncate_to_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(at.nanosecond() / 1_000 * 1_000).unwrap_or(at)
}
