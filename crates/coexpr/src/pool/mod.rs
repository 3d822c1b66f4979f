//! Fixed-size pool of correlation workers.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`]: round-robin dispatch and shutdown.
//! - [`worker`] - the long-running worker loop.
//! - [`request`] - messages exchanged between the pool and its workers.

pub mod manager;
pub mod request;
pub mod worker;

pub use manager::WorkerPool;
pub use request::{CorrelationUnit, WorkRequest};
