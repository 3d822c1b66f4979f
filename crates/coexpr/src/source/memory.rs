use super::{BatchSource, BatchStream, ColumnarBatch};
use crate::{Error, PipelineRequest, Result};
use arrow::record_batch::RecordBatch;
use core::future::Future;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Serves profiles from batches held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    profiles: Arc<HashMap<String, Vec<RecordBatch>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `batches` under `profile_id`, replacing any previous entry.
    #[must_use]
    pub fn with_profile(mut self, profile_id: impl Into<String>, batches: Vec<RecordBatch>) -> Self {
        Arc::make_mut(&mut self.profiles).insert(profile_id.into(), batches);
        self
    }
}

impl BatchSource for MemorySource {
    fn fetch(&self, request: &PipelineRequest) -> impl Future<Output = Result<BatchStream>> + Send {
        let batches = self.profiles.get(&request.profile_id).cloned();
        let profile_id = request.profile_id.clone();

        async move {
            let batches = batches.ok_or_else(|| Error::Source {
                context: format!("unknown molecular profile `{profile_id}`"),
            })?;
            let stream = futures::stream::iter(batches)
                .map(|batch| Ok(ColumnarBatch::new(batch)))
                .boxed();
            Ok(stream)
        }
    }
}
