//! MongoDB journal backend.
//!
//! `streams` holds one `{_id, version}` document per stream; `events` holds
//! one document per event with a unique index on `(stream_id, version)`.
//! The stream transition and the event insert run in a single
//! multi-document transaction, which needs a replica set or sharded cluster.
//! A session dropped before commit is aborted by the driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, oid::ObjectId, Binary};
use mongodb::error::{
    Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::options::{
    Acknowledgment, ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions,
    ReadConcern, ReturnDocument, TransactionOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::StorageBackend;
use crate::config::DatabaseConfig;
use crate::error::{JournalError, Result};
use crate::journal::model::{format_timestamp, PendingEvent, RecordedEvent, StreamId};

pub const STREAMS_COLLECTION: &str = "streams";
pub const EVENTS_COLLECTION: &str = "events";
const STREAM_VERSION_INDEX: &str = "stream_id_version_unique";

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;
const NAMESPACE_EXISTS: i32 = 48;

/// Stream document in the `streams` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamDocument {
    #[serde(rename = "_id")]
    id: String,
    version: i64,
}

/// Event document in the `events` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    stream_id: String,
    version: i64,
    kind: String,
    encoding: String,
    source: String,
    payload: Binary,
    timestamp: String,
}

impl EventDocument {
    fn from_pending(event: &PendingEvent, version: i64) -> Self {
        Self {
            id: None,
            stream_id: event.stream_id.to_string(),
            version,
            kind: event.event.kind.clone(),
            encoding: event.event.encoding.clone(),
            source: event.event.source.clone(),
            payload: Binary {
                subtype: BinarySubtype::Generic,
                bytes: event.event.payload.clone(),
            },
            timestamp: format_timestamp(event.recorded_at),
        }
    }

    fn into_recorded(self) -> Result<RecordedEvent> {
        let recorded_at = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| {
                JournalError::internal(format!(
                    "event {}@{} has an unreadable timestamp {:?}: {}",
                    self.stream_id, self.version, self.timestamp, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(RecordedEvent {
            id: self.id.map(|id| id.to_hex()),
            stream_id: self.stream_id,
            version: self.version,
            kind: self.kind,
            encoding: self.encoding,
            source: self.source,
            payload: self.payload.bytes,
            recorded_at,
        })
    }
}

/// Journal backend on a MongoDB client.
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    db: Database,
    streams: Collection<StreamDocument>,
    events: Collection<EventDocument>,
}

impl MongoBackend {
    /// Connect from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.require_url()?;
        let mut options = ClientOptions::parse(url).await.map_err(|e| classify(e, None))?;
        options.app_name = Some("journal".to_string());
        options.max_pool_size = Some(config.max_connections);
        options.min_pool_size = Some(config.min_connections);
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options).map_err(|e| classify(e, None))?;
        Self::new(client, &config.name, config.ensure_schema).await
    }

    /// Wrap an already-initialized client.
    pub async fn new(client: Client, database: &str, ensure_indexes: bool) -> Result<Self> {
        let db = client.database(database);
        let backend = Self {
            streams: db.collection(STREAMS_COLLECTION),
            events: db.collection(EVENTS_COLLECTION),
            db,
            client,
        };
        if ensure_indexes {
            backend.ensure_indexes().await?;
        }
        Ok(backend)
    }

    /// Create both collections and the unique `(stream_id, version)` index.
    /// Idempotent.
    ///
    /// Servers before 4.4 cannot create a collection inside a transaction.
    pub async fn ensure_indexes(&self) -> Result<()> {
        for name in [STREAMS_COLLECTION, EVENTS_COLLECTION] {
            match self.db.create_collection(name, None).await {
                Ok(()) => {}
                Err(e) if already_exists(server_code(&e)) => {}
                Err(e) => return Err(classify(e, None)),
            }
        }

        let index = IndexModel::builder()
            .keys(doc! { "stream_id": 1, "version": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(STREAM_VERSION_INDEX.to_string())
                    .build(),
            )
            .build();

        self.events
            .create_index(index, None)
            .await
            .map_err(|e| classify(e, None))?;
        tracing::info!("MongoDB journal indexes ensured");
        Ok(())
    }

    /// Transition the stream and insert the event inside `session`'s transaction.
    async fn append_in_transaction(
        &self,
        event: &PendingEvent,
        session: &mut ClientSession,
    ) -> Result<i64> {
        let stream_id = event.stream_id.as_str();
        let expected = event.expected_version;

        let version = if expected == 0 {
            let stream = StreamDocument {
                id: stream_id.to_string(),
                version: 1,
            };
            self.streams
                .insert_one_with_session(stream, None, session)
                .await
                .map_err(|e| classify(e, Some(event)))?;
            1
        } else {
            let updated = self
                .streams
                .find_one_and_update_with_session(
                    doc! { "_id": stream_id, "version": expected },
                    doc! { "$inc": { "version": 1_i64 } },
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                    session,
                )
                .await
                .map_err(|e| classify(e, Some(event)))?;

            match updated {
                Some(stream) => stream.version,
                None => {
                    let actual = self
                        .streams
                        .find_one_with_session(doc! { "_id": stream_id }, None, session)
                        .await
                        .map_err(|e| classify(e, Some(event)))?
                        .map(|stream| stream.version)
                        .unwrap_or(0);
                    return Err(JournalError::version_conflict(stream_id, expected, Some(actual)));
                }
            }
        };

        self.events
            .insert_one_with_session(EventDocument::from_pending(event, version), None, session)
            .await
            .map_err(|e| classify(e, Some(event)))?;

        Ok(version)
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    #[instrument(
        skip(self, event),
        fields(stream_id = %event.stream_id, expected_version = event.expected_version)
    )]
    async fn append_event(&self, event: &PendingEvent) -> Result<i64> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(|e| classify(e, Some(event)))?;

        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::majority())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session
            .start_transaction(options)
            .await
            .map_err(|e| classify(e, Some(event)))?;

        match self.append_in_transaction(event, &mut session).await {
            Ok(version) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| classify(e, Some(event)))?;
                tracing::debug!(version, "Event appended");
                Ok(version)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort append transaction");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(stream_id = %stream_id))]
    async fn get_stream_events(&self, stream_id: &StreamId) -> Result<Vec<RecordedEvent>> {
        let options = FindOptions::builder().sort(doc! { "version": 1 }).build();
        let documents: Vec<EventDocument> = self
            .events
            .find(doc! { "stream_id": stream_id.as_str() }, options)
            .await
            .map_err(|e| classify(e, None).with_stream(stream_id.as_str()))?
            .try_collect()
            .await
            .map_err(|e| classify(e, None).with_stream(stream_id.as_str()))?;

        documents
            .into_iter()
            .map(EventDocument::into_recorded)
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| classify(e, None))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

// =============================================================================
// Error classification
// =============================================================================

/// What a driver error means for the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Conflict,
    Unavailable,
    Internal,
}

/// Server error code carried by a write or command failure.
fn server_code(error: &MongoError) -> Option<i32> {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        ErrorKind::Command(command_error) => Some(command_error.code),
        _ => None,
    }
}

fn already_exists(code: Option<i32>) -> bool {
    code == Some(NAMESPACE_EXISTS)
}

fn is_network(error: &MongoError) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. }
    )
}

fn outcome(code: Option<i32>, network: bool, transient: bool, appending: bool) -> Outcome {
    match code {
        Some(DUPLICATE_KEY) | Some(WRITE_CONFLICT) if appending => Outcome::Conflict,
        _ if network || transient => Outcome::Unavailable,
        _ => Outcome::Internal,
    }
}

/// Map a driver error onto the canonical error kinds.
fn classify(error: MongoError, append: Option<&PendingEvent>) -> JournalError {
    let transient = error.contains_label(TRANSIENT_TRANSACTION_ERROR)
        || error.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT);

    let kind = outcome(server_code(&error), is_network(&error), transient, append.is_some());

    let journal_error = match (kind, append) {
        (Outcome::Conflict, Some(event)) => {
            JournalError::version_conflict(event.stream_id.as_str(), event.expected_version, None)
        }
        (Outcome::Unavailable, _) => JournalError::unavailable(error.to_string()),
        _ => JournalError::internal(error.to_string()),
    };

    let journal_error = match append {
        Some(event) => journal_error.with_stream(event.stream_id.as_str()),
        None => journal_error,
    };
    journal_error.with_source(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::journal::model::NewEvent;
    use chrono::TimeZone;

    #[test]
    fn test_duplicate_key_while_appending_is_conflict() {
        assert_eq!(outcome(Some(DUPLICATE_KEY), false, false, true), Outcome::Conflict);
        assert_eq!(outcome(Some(WRITE_CONFLICT), false, true, true), Outcome::Conflict);
    }

    #[test]
    fn test_duplicate_key_outside_append_is_internal() {
        assert_eq!(outcome(Some(DUPLICATE_KEY), false, false, false), Outcome::Internal);
    }

    #[test]
    fn test_network_and_transient_are_unavailable() {
        assert_eq!(outcome(None, true, false, true), Outcome::Unavailable);
        assert_eq!(outcome(Some(251), false, true, true), Outcome::Unavailable);
        assert_eq!(outcome(Some(2), false, false, true), Outcome::Internal);
    }

    #[test]
    fn test_existing_collection_is_not_an_error() {
        assert!(already_exists(Some(NAMESPACE_EXISTS)));
        assert!(!already_exists(Some(DUPLICATE_KEY)));
        assert!(!already_exists(None));
    }

    #[test]
    fn test_event_document_roundtrip() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
            + chrono::Duration::microseconds(42);
        let pending = PendingEvent {
            stream_id: StreamId::new("s1").unwrap(),
            expected_version: 0,
            event: NewEvent::new("k1")
                .with_encoding("e1")
                .with_source("s1")
                .with_payload(vec![0_u8, 159, 146, 150]),
            recorded_at: at,
        };

        let mut document = EventDocument::from_pending(&pending, 1);
        assert_eq!(document.timestamp, "2026-10-19T08:00:00.000042Z");
        document.id = Some(ObjectId::new());

        let recorded = document.into_recorded().unwrap();
        assert_eq!(recorded.version, 1);
        assert_eq!(recorded.payload, vec![0_u8, 159, 146, 150]);
        assert_eq!(recorded.recorded_at, at);
        assert_eq!(recorded.id.as_ref().map(String::len), Some(24));
    }

    #[test]
    fn test_unreadable_timestamp_is_internal() {
        let document = EventDocument {
            id: None,
            stream_id: "s1".into(),
            version: 1,
            kind: "k".into(),
            encoding: "e".into(),
            source: "s".into(),
            payload: Binary {
                subtype: BinarySubtype::Generic,
                bytes: vec![],
            },
            timestamp: "yesterday".into(),
        };
        let err = document.into_recorded().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }
}
