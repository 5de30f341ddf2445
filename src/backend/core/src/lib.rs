//! # Journal Core
//!
//! Append-only, per-stream versioned event journal.
//!
//! ## Architecture
//!
//! - **Journal**: validation, timestamps and cancellation around one backend
//! - **Storage**: PostgreSQL, MongoDB and in-process backends behind one trait
//! - **API**: tonic gRPC service plus an axum admin surface
//! - **Observability**: structured logging, OTLP tracing and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod journal;
pub mod observability;
pub mod storage;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, JournalError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorCode, JournalError, Result};
    pub use crate::journal::{
        AppendRequest, CallContext, Clock, Journal, NewEvent, RecordedEvent, StreamId,
        SystemClock,
    };
    pub use crate::storage::{MemoryBackend, MongoBackend, PostgresBackend, StorageBackend};
}
