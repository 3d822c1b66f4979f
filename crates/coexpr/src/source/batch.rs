use arrow::record_batch::RecordBatch;
use core::fmt;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A columnar batch on loan from a [`BatchSource`](super::BatchSource).
///
/// The source may attach a release hook that runs exactly once, either when
/// the consumer calls [`release`](Self::release) or when the batch is dropped.
/// Taking `self` by value means a released batch can no longer be referenced.
pub struct ColumnarBatch {
    batch: RecordBatch,
    on_release: Option<ReleaseHook>,
}

impl ColumnarBatch {
    pub fn new(batch: RecordBatch) -> Self {
        Self {
            batch,
            on_release: None,
        }
    }

    /// Attaches a hook that runs when the batch is released.
    #[must_use]
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Drops the backing buffers and notifies the source.
    pub fn release(self) {
        drop(self);
    }
}

impl From<RecordBatch> for ColumnarBatch {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}

impl Drop for ColumnarBatch {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl fmt::Debug for ColumnarBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnarBatch")
            .field("num_rows", &self.batch.num_rows())
            .field("num_columns", &self.batch.num_columns())
            .finish_non_exhaustive()
    }
}
