//! Storage backends.
//!
//! Every backend implements [`StorageBackend`] with the same contract:
//!
//! - `append_event` performs the version transition and the event insert as
//!   one atomic unit, and reports a lost race as `VersionConflict`.
//! - `get_stream_events` returns committed events in ascending version order,
//!   and an empty vector for unknown streams.
//!
//! Driver errors are classified into [`crate::error::ErrorCode`]s inside each
//! backend module; none escape except as an opaque `source()`.
//!
//! - **PostgresBackend**: one transaction around the `append_event` function
//! - **MongoBackend**: one multi-document transaction on a client session
//! - **MemoryBackend**: per-stream entry lock, for tests and development

pub mod memory;
pub mod mongo;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DatabaseConfig, Driver};
use crate::error::Result;
use crate::journal::model::{PendingEvent, RecordedEvent, StreamId};

pub use memory::MemoryBackend;
pub use mongo::MongoBackend;
pub use postgres::PostgresBackend;

/// The capability set every journal backend provides.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Atomically advance the stream to `event.next_version()` and insert the
    /// event. Returns the assigned version.
    async fn append_event(&self, event: &PendingEvent) -> Result<i64>;

    /// All committed events of the stream, ascending by version.
    async fn get_stream_events(&self, stream_id: &StreamId) -> Result<Vec<RecordedEvent>>;

    /// Cheap round-trip used by readiness probes.
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the backend selected by configuration. Called once at startup.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.driver {
        Driver::Postgres => Arc::new(PostgresBackend::connect(config).await?),
        Driver::Mongodb => Arc::new(MongoBackend::connect(config).await?),
        Driver::Memory => Arc::new(MemoryBackend::new()),
    };

    tracing::info!(backend = backend.name(), "Storage backend ready");
    Ok(backend)
}
