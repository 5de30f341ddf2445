//! gRPC service implementation for the journal.
//!
//! Binds [`Journal`] to the `journal.v1.Journal` service defined in
//! `proto/journal.proto`. Each call gets its own [`CallContext`], built from
//! the `grpc-timeout` header or the configured default. When a client goes
//! away tonic drops the handler future, and the in-flight backend call with it.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::config::ServerConfig;
use crate::error::{ErrorCode, JournalError};
use crate::journal::model::{format_timestamp, AppendRequest, NewEvent, RecordedEvent};
use crate::journal::{CallContext, Journal};

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("journal.v1");
}

use proto::journal_server::{Journal as JournalRpc, JournalServer};
use proto::*;

/// Metadata keys attached to `ABORTED` statuses.
pub const STREAM_ID_HEADER: &str = "x-journal-stream-id";
pub const EXPECTED_VERSION_HEADER: &str = "x-journal-expected-version";
pub const ACTUAL_VERSION_HEADER: &str = "x-journal-actual-version";
/// Canonical error code, on every error status.
pub const ERROR_CODE_HEADER: &str = "x-journal-error-code";

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

// ═══════════════════════════════════════════════════════════════════════════════
// Type Conversions
// ═══════════════════════════════════════════════════════════════════════════════

fn from_proto_append(req: AppendEventRequest) -> AppendRequest {
    AppendRequest::new(
        req.stream_id,
        req.expected_version,
        NewEvent {
            kind: req.kind,
            encoding: req.encoding,
            source: req.source,
            payload: req.payload,
        },
    )
}

fn to_proto_event(event: RecordedEvent) -> Event {
    Event {
        timestamp: format_timestamp(event.recorded_at),
        id: event.id.unwrap_or_default(),
        stream_id: event.stream_id,
        version: event.version,
        kind: event.kind,
        encoding: event.encoding,
        source: event.source,
        payload: event.payload,
    }
}

fn insert_ascii(metadata: &mut MetadataMap, key: &'static str, value: &str) {
    if let Ok(value) = value.parse::<AsciiMetadataValue>() {
        metadata.insert(key, value);
    }
}

/// Convert a JournalError to a gRPC Status
pub fn to_grpc_status(err: &JournalError) -> Status {
    let mut status = Status::new(err.code().grpc_code(), err.user_message().to_string());
    let metadata = status.metadata_mut();
    insert_ascii(metadata, ERROR_CODE_HEADER, err.code().as_str());

    if err.code() == ErrorCode::VersionConflict {
        let details = err.details();
        if let Some(stream_id) = details.stream_id.as_deref() {
            insert_ascii(metadata, STREAM_ID_HEADER, stream_id);
        }
        if let Some(expected) = details.expected_version {
            insert_ascii(metadata, EXPECTED_VERSION_HEADER, &expected.to_string());
        }
        if let Some(actual) = details.actual_version {
            insert_ascii(metadata, ACTUAL_VERSION_HEADER, &actual.to_string());
        }
    }

    status
}

/// Parse a `grpc-timeout` header value: up to 8 digits and a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let unit = value.chars().last()?;
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        'H' => Some(Duration::from_secs(amount * 3600)),
        'M' => Some(Duration::from_secs(amount * 60)),
        'S' => Some(Duration::from_secs(amount)),
        'm' => Some(Duration::from_millis(amount)),
        'u' => Some(Duration::from_micros(amount)),
        'n' => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// The journal gRPC service implementation
#[derive(Clone)]
pub struct JournalGrpcService {
    journal: Journal,
    request_timeout: Duration,
}

impl JournalGrpcService {
    /// `request_timeout` applies to calls without a `grpc-timeout` header.
    pub fn new(journal: Journal, request_timeout: Duration) -> Self {
        Self {
            journal,
            request_timeout,
        }
    }

    /// Wrap into the generated tower service with message size limits.
    pub fn into_server(self, max_message_size: usize) -> JournalServer<Self> {
        JournalServer::new(self)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size)
    }

    fn call_context<T>(&self, request: &Request<T>) -> CallContext {
        let timeout = request
            .metadata()
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .unwrap_or(self.request_timeout);
        CallContext::with_timeout(timeout)
    }
}

#[tonic::async_trait]
impl JournalRpc for JournalGrpcService {
    #[instrument(skip(self, request), fields(rpc = "AppendEvent"))]
    async fn append_event(
        &self,
        request: Request<AppendEventRequest>,
    ) -> Result<Response<AppendEventResponse>, Status> {
        let ctx = self.call_context(&request);
        let assigned_version = self
            .journal
            .append(&ctx, from_proto_append(request.into_inner()))
            .await
            .map_err(|err| to_grpc_status(&err))?;
        Ok(Response::new(AppendEventResponse { assigned_version }))
    }

    #[instrument(skip(self, request), fields(rpc = "GetStreamEvents"))]
    async fn get_stream_events(
        &self,
        request: Request<GetStreamEventsRequest>,
    ) -> Result<Response<GetStreamEventsResponse>, Status> {
        let ctx = self.call_context(&request);
        let req = request.into_inner();
        let events = self
            .journal
            .get_stream_events(&ctx, &req.stream_id)
            .await
            .map_err(|err| to_grpc_status(&err))?;
        Ok(Response::new(GetStreamEventsResponse {
            events: events.into_iter().map(to_proto_event).collect(),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Server Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the gRPC server
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,

    /// Maximum concurrent streams per connection
    pub max_concurrent_streams: Option<u32>,

    /// HTTP/2 keep-alive interval
    pub http2_keepalive_interval: Option<Duration>,

    /// HTTP/2 keep-alive timeout
    pub http2_keepalive_timeout: Option<Duration>,

    /// Default per-call deadline
    pub request_timeout: Duration,

    /// Maximum message size
    pub max_message_size: usize,
}

impl From<&ServerConfig> for GrpcServerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            addr: config.grpc_addr,
            request_timeout: config.request_timeout,
            max_message_size: config.max_message_size,
            ..Self::default()
        }
    }
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            addr: server.grpc_addr,
            max_concurrent_streams: Some(1000),
            http2_keepalive_interval: Some(Duration::from_secs(10)),
            http2_keepalive_timeout: Some(Duration::from_secs(20)),
            request_timeout: server.request_timeout,
            max_message_size: server.max_message_size,
        }
    }
}

/// Serve the journal until `shutdown` resolves.
pub async fn serve_grpc<F>(
    config: GrpcServerConfig,
    journal: Journal,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    let mut server = tonic::transport::Server::builder();

    // Configure HTTP/2 settings
    if let Some(interval) = config.http2_keepalive_interval {
        server = server.http2_keepalive_interval(Some(interval));
    }

    if let Some(timeout) = config.http2_keepalive_timeout {
        server = server.http2_keepalive_timeout(Some(timeout));
    }

    if let Some(max_streams) = config.max_concurrent_streams {
        server = server.concurrency_limit_per_connection(max_streams as usize);
    }

    let service = JournalGrpcService::new(journal, config.request_timeout)
        .into_server(config.max_message_size);

    tracing::info!(addr = %config.addr, "Starting journal gRPC server");

    server
        .add_service(service)
        .serve_with_shutdown(config.addr, shutdown)
        .await
}
