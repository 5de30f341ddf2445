//! Clients for the journal server: gRPC for data, HTTP for admin endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use journal_core::api::grpc::proto::journal_client::JournalClient;
use journal_core::api::grpc::proto::{
    AppendEventRequest, Event, GetStreamEventsRequest,
};
use journal_core::api::grpc::{
    ACTUAL_VERSION_HEADER, EXPECTED_VERSION_HEADER, STREAM_ID_HEADER,
};
use reqwest::{Client, StatusCode};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// gRPC client for the journal service.
pub struct JournalRpc {
    inner: JournalClient<Channel>,
}

impl JournalRpc {
    /// Connect to the server at `url`, applying `timeout` to every call.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(url.to_string())
            .with_context(|| format!("Invalid server URL {}", url))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        Ok(Self {
            inner: JournalClient::new(channel),
        })
    }

    pub async fn append(&mut self, request: AppendEventRequest) -> Result<i64> {
        let response = self
            .inner
            .append_event(request)
            .await
            .map_err(describe_status)?;
        Ok(response.into_inner().assigned_version)
    }

    pub async fn read(&mut self, stream_id: &str) -> Result<Vec<Event>> {
        let response = self
            .inner
            .get_stream_events(GetStreamEventsRequest {
                stream_id: stream_id.to_string(),
            })
            .await
            .map_err(describe_status)?;
        Ok(response.into_inner().events)
    }
}

/// Turn a gRPC status into a readable error, spelling out version conflicts.
pub fn describe_status(status: Status) -> anyhow::Error {
    if status.code() == tonic::Code::Aborted {
        let header = |key: &str| {
            status
                .metadata()
                .get(key)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        if let (Some(stream), Some(expected)) = (header(STREAM_ID_HEADER), header(EXPECTED_VERSION_HEADER)) {
            let actual = header(ACTUAL_VERSION_HEADER).unwrap_or_else(|| "unknown".to_string());
            return anyhow::anyhow!(
                "Version conflict on stream {}: expected version {}, actual version {}",
                stream,
                expected,
                actual
            );
        }
    }
    anyhow::anyhow!("{:?}: {}", status.code(), status.message())
}

/// HTTP client for the admin surface.
pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    /// Create a new admin client pointing at the given base URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and return the status with the JSON body.
    ///
    /// Non-2xx answers are not errors here; readiness reports failure as 503.
    pub async fn get_raw(&self, path: &str) -> Result<(StatusCode, serde_json::Value)> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        let body = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok((status, body))
    }
}
