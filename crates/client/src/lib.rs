//! Remote surface of a catena-managed database.
//!
//! The execution engine never talks to the target database directly. It goes
//! through the two contracts defined here: [`StatusStore`] is the durable
//! per-migration status record and [`SchemaAdmin`] is the schema-changing
//! surface. [`http::HttpAdminClient`] implements both over the schema admin
//! HTTP endpoint; [`memory::MemoryAdmin`] (feature `testing`) is an
//! in-process backend for tests.

pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;

pub use http::HttpAdminClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid schema admin endpoint `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("schema admin rejected {operation} (status {status}): {message}")]
    Rejected {
        operation: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("malformed {operation} response: {source}")]
    Malformed {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("statement batch refused: {0}")]
    StatementRefused(String),
}

/// Durable migration status record kept alongside the schema.
///
/// The record is the source of truth for what has run against the database.
/// Implementations must make [`record_status`](Self::record_status) visible
/// to every later [`migration_statuses`](Self::migration_statuses) call,
/// including ones from a different process.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Every migration id the store has a row for, with its applied flag.
    /// Ids with no row are simply absent.
    async fn migration_statuses(&self) -> Result<HashMap<String, bool>, ClientError>;

    /// Durably record `applied` for `id`, creating the row if needed.
    async fn record_status(&self, id: &str, applied: bool) -> Result<(), ClientError>;
}

/// Schema-changing surface of the target database.
#[async_trait]
pub trait SchemaAdmin: Send + Sync {
    /// Apply one migration's statement batch. The server applies the batch
    /// atomically: either every statement lands or none do.
    async fn apply_ddl(&self, statements: &[String]) -> Result<(), ClientError>;

    /// Connectivity probe, run before any stateful operation.
    async fn health_check(&self) -> Result<(), ClientError>;
}
