//! Error types for the co-expression pipeline.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of a co-expression request. Each variant belongs to one
//! of the failure classes a caller can act on:
//!
//! ## Error Cases
//! - `InvalidRequest`: Malformed input or missing/invalid parameters.
//! - `Source`: The batch source failed to open, authenticate, or stream.
//! - `Schema`: A columnar batch lacked a required column or carried an
//!   unexpected type or null cell.
//! - `Computation`: Mismatched vector lengths or a numerical failure in the
//!   rank-correlation capability.
//! - `QueryGeneNotFound`: The query gene has no values in the profile.
//! - `ChannelError`: An internal communication failure between stages or
//!   workers.
//! - `Cancelled`: The request was cancelled (typically a client disconnect).
//! - `ServiceShutdown`: Work arrived while the worker pool was shutting down.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for co-expression requests.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The request was malformed or violated a constraint.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The remote or local batch source failed.
    #[error("Source error: {context}")]
    Source { context: String },

    /// A columnar batch did not match the expected schema.
    #[error("Schema error: {reason}")]
    Schema { reason: String },

    /// Correlation could not be computed for a gene pair.
    #[error("Computation error: {reason}")]
    Computation { reason: String },

    /// The query gene is absent from the profile.
    #[error("Query gene {gene_id} not found in profile")]
    QueryGeneNotFound { gene_id: i64 },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The request was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The worker pool is shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Source {
            context: err.to_string(),
        }
    }
}
