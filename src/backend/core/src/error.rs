//! Error handling for the journal core.
//!
//! Every failure that leaves the core is a [`JournalError`] carrying one of a
//! small set of canonical [`ErrorCode`]s. Storage backends classify their own
//! driver errors into these codes before returning, so no driver type crosses
//! the public contract except as an opaque `source()`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use journal_core::error::{ErrorCode, JournalError};
//!
//! match journal.append(&ctx, request).await {
//!     Ok(version) => println!("assigned {version}"),
//!     Err(e) if e.code() == ErrorCode::VersionConflict => {
//!         // re-read the stream and retry
//!     }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and map one-to-one onto gRPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Empty stream identifier, negative expected version.
    InvalidArgument,
    /// Expected version does not match the stream's current version.
    VersionConflict,
    /// The caller cancelled the operation.
    Cancelled,
    /// The operation's deadline elapsed before the backend answered.
    DeadlineExceeded,
    /// The backend could not be reached or refused service.
    Unavailable,
    /// Any other backend or internal failure.
    Internal,
    /// Invalid or missing configuration (bootstrap only).
    ConfigurationError,
}

impl ErrorCode {
    /// Stable string form used in metrics labels and gRPC metadata.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::VersionConflict => "VERSION_CONFLICT",
            Self::Cancelled => "CANCELLED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// The gRPC status code a caller observes for this error.
    pub const fn grpc_code(&self) -> tonic::Code {
        match self {
            Self::InvalidArgument => tonic::Code::InvalidArgument,
            Self::VersionConflict => tonic::Code::Aborted,
            Self::Cancelled => tonic::Code::Cancelled,
            Self::DeadlineExceeded => tonic::Code::DeadlineExceeded,
            Self::Unavailable => tonic::Code::Unavailable,
            Self::Internal | Self::ConfigurationError => tonic::Code::Internal,
        }
    }

    /// Whether the *caller* may reasonably retry. The core never retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict | Self::Unavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors and expected races
    Low,
    /// Operational issues (timeouts, cancellations)
    Medium,
    /// Backend failures
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidArgument | ErrorCode::VersionConflict => Self::Low,
            ErrorCode::Cancelled | ErrorCode::DeadlineExceeded => Self::Medium,
            ErrorCode::Unavailable | ErrorCode::Internal | ErrorCode::ConfigurationError => {
                Self::High
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured context attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Stream the failed operation targeted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,

    /// Version the caller presented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,

    /// Version the backend observed, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_version: Option<i64>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn with_versions(mut self, expected: i64, actual: Option<i64>) -> Self {
        self.expected_version = Some(expected);
        self.actual_version = actual;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type of every journal operation.
#[derive(Error, Debug)]
pub struct JournalError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Message safe to expose to callers
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The driver error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl JournalError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Create a version conflict error.
    ///
    /// `actual` is `None` when the backend could not observe the current
    /// version inside the same atomic unit.
    pub fn version_conflict(stream_id: impl Into<String>, expected: i64, actual: Option<i64>) -> Self {
        let stream_id = stream_id.into();
        let message = match actual {
            Some(actual) => format!(
                "Version conflict on stream {}: expected version {}, actual version {}",
                stream_id, expected, actual
            ),
            None => format!(
                "Version conflict on stream {}: expected version {}",
                stream_id, expected
            ),
        };
        Self::new(ErrorCode::VersionConflict, message).with_details(
            ErrorDetails::new()
                .with_stream(stream_id)
                .with_versions(expected, actual),
        )
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "The operation was cancelled")
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded() -> Self {
        Self::new(
            ErrorCode::DeadlineExceeded,
            "The operation did not complete before its deadline",
        )
    }

    /// Create a backend unavailable error.
    pub fn unavailable(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::Unavailable,
            "The storage backend is unavailable",
            internal,
        )
    }

    /// Create an internal error.
    pub fn internal(internal: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::Internal, "An internal error occurred", internal)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Replace the error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Attach the stream the operation targeted, keeping other details.
    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        if self.details.stream_id.is_none() {
            self.details.stream_id = Some(stream_id.into());
        }
        self
    }

    /// Attach the version the caller presented, keeping other details.
    pub fn with_expected_version(mut self, expected: i64) -> Self {
        if self.details.expected_version.is_none() {
            self.details.expected_version = Some(expected);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_version_conflict(&self) -> bool {
        self.code == ErrorCode::VersionConflict
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with a level derived from its severity.
    pub fn log(&self) {
        let stream_id = self.details.stream_id.as_deref().unwrap_or("");
        match self.severity() {
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %self.code,
                    stream_id,
                    expected_version = ?self.details.expected_version,
                    actual_version = ?self.details.actual_version,
                    message = %self.user_message,
                    "Request rejected"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %self.code,
                    stream_id,
                    message = %self.user_message,
                    "Operation aborted"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %self.code,
                    stream_id,
                    message = %self.user_message,
                    internal = ?self.internal_message,
                    source = ?self.source.as_ref().map(|s| s.to_string()),
                    "Backend failure"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!("journal_errors_total", "code" => self.code.as_str()).increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<config::ConfigError> for JournalError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
