//! Network surfaces of the journal.
//!
//! - **gRPC** (tonic): the `journal.v1.Journal` service
//! - **Admin** (axum): health probes and Prometheus metrics

pub mod admin;
pub mod grpc;

pub use admin::{admin_router, serve_admin, AdminState};
pub use grpc::{serve_grpc, to_grpc_status, GrpcServerConfig, JournalGrpcService};
