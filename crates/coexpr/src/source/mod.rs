//! Batch sources feeding the pipeline.
//!
//! A [`BatchSource`] turns a [`PipelineRequest`] into a finite, ordered stream
//! of [`ColumnarBatch`]es. The remote columnar service used in production sits
//! behind this trait; [`MemorySource`] and [`IpcDirectorySource`] are the
//! in-tree adapters.

mod batch;
mod ipc;
mod memory;

pub use batch::ColumnarBatch;
pub use ipc::IpcDirectorySource;
pub use memory::MemorySource;

use crate::{PipelineRequest, Result};
use core::future::Future;
use futures::stream::BoxStream;

/// Ordered stream of batches for one request.
pub type BatchStream = BoxStream<'static, Result<ColumnarBatch>>;

/// Source of columnar batches for a molecular profile.
pub trait BatchSource: Send + Sync + 'static {
    /// Opens the profile named by `request` and returns its batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`](crate::Error::Source) if the profile cannot
    /// be opened. Failures while streaming are yielded as stream items.
    fn fetch(&self, request: &PipelineRequest) -> impl Future<Output = Result<BatchStream>> + Send;
}
