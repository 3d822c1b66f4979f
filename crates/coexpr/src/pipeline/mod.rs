//! Request orchestration: fetch → materialize → aggregate → barrier → fan-out.
//!
//! [`Pipeline::run`] wires the stages together with bounded queues, waits for
//! the aggregation barrier and validates the fan-out, then hands back a
//! [`CoExpressionStream`]. Every failure that can be known before the first
//! result (unknown profile, schema violation, missing query gene, misaligned
//! vectors) is returned from `run` itself, so a caller never has to retract a
//! partially written response for those.
//!
//! Each stage runs as its own task and selects on the request's
//! [`CancellationToken`] around every queue operation. The token is held by a
//! drop guard, first inside `run` and then inside the returned stream, so
//! dropping either one stops every stage.

mod aggregate;
mod channel;
mod fanout;
mod fetch;
mod materialize;

use crate::{
    CoExpression, Error, PipelineConfig, PipelineRequest, Result,
    pool::WorkerPool,
    source::BatchSource,
};
use aggregate::aggregate_vectors;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use fanout::{CorrelationPlan, dispatch_units};
use fetch::fetch_batches;
use futures::Stream;
use materialize::materialize_rows;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Co-expression pipeline bound to a batch source and a shared worker pool.
pub struct Pipeline<S> {
    source: Arc<S>,
    pool: Arc<WorkerPool>,
    config: PipelineConfig,
}

impl<S: BatchSource> Pipeline<S> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if any queue capacity is zero.
    pub fn new(source: Arc<S>, pool: Arc<WorkerPool>, config: PipelineConfig) -> Result<Self> {
        for (name, size) in [
            ("batch_buffer_size", config.batch_buffer_size),
            ("row_buffer_size", config.row_buffer_size),
            ("result_buffer_size", config.result_buffer_size),
        ] {
            if size == 0 {
                return Err(Error::InvalidRequest {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        Ok(Self {
            source,
            pool,
            config,
        })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns a fresh request token tied to the pool's shutdown.
    pub fn request_token(&self) -> CancellationToken {
        self.pool.request_token()
    }

    /// Runs one request up to the point where results start flowing.
    ///
    /// # Errors
    ///
    /// - [`Error::Source`] if the profile cannot be opened or streamed.
    /// - [`Error::Schema`] if a batch violates the schema under
    ///   [`SchemaPolicy::Abort`](crate::SchemaPolicy::Abort).
    /// - [`Error::QueryGeneNotFound`] if the query gene has no values while
    ///   other genes do.
    /// - [`Error::Computation`] if gene vectors have differing lengths.
    /// - [`Error::Cancelled`] if `cancel` fires first.
    /// - [`Error::ServiceShutdown`] if the pool is shutting down.
    pub async fn run(
        &self,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<CoExpressionStream> {
        let guard = cancel.clone().drop_guard();

        if self.pool.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        let batches = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            fetched = self.source.fetch(&request) => fetched?,
        };

        let (batch_tx, batch_rx) = mpsc::channel(self.config.batch_buffer_size);
        let (row_tx, row_rx) = mpsc::channel(self.config.row_buffer_size);
        let (barrier_tx, barrier_rx) = oneshot::channel();

        spawn_stage("fetch", fetch_batches(batches, batch_tx, cancel.clone()));
        spawn_stage(
            "materialize",
            materialize_rows(batch_rx, row_tx, self.config.schema_policy, cancel.clone()),
        );
        spawn_stage(
            "aggregate",
            aggregate_vectors(
                row_rx,
                self.config.vector_capacity_hint,
                barrier_tx,
                cancel.clone(),
            ),
        );

        let table = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            table = barrier_rx => table.map_err(|_| Error::ChannelError {
                context: "aggregation barrier dropped".to_string(),
            })??,
        };

        let plan = CorrelationPlan::prepare(table, request.query_gene_id)?;
        let num_units = plan.num_units();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Correlating gene {} against {num_units} genes of `{}`",
            request.query_gene_id,
            request.profile_id
        );

        let (result_tx, result_rx) = mpsc::channel(self.config.result_buffer_size);
        spawn_stage(
            "fan-out",
            dispatch_units(plan, Arc::clone(&self.pool), result_tx, cancel.clone()),
        );

        Ok(CoExpressionStream {
            inner: ReceiverStream::new(result_rx),
            cancel,
            num_units,
            finished: false,
            _guard: guard,
        })
    }
}

fn spawn_stage<F>(_name: &'static str, stage: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let stage = tracing::Instrument::instrument(
        stage,
        tracing::debug_span!("pipeline_stage", stage = _name),
    );
    tokio::spawn(stage);
}

/// Results of one request, in completion order.
///
/// Ends after the last correlation unit completes. If the request was
/// cancelled, the final item is [`Error::Cancelled`] so a consumer never
/// mistakes a cut-short stream for a complete one. Dropping the stream
/// cancels the request.
pub struct CoExpressionStream {
    inner: ReceiverStream<Result<CoExpression>>,
    cancel: CancellationToken,
    num_units: usize,
    finished: bool,
    _guard: DropGuard,
}

impl CoExpressionStream {
    /// Number of results the stream yields when nothing fails.
    pub fn num_units(&self) -> usize {
        self.num_units
    }

    /// Cancels the request. Buffered results are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for CoExpressionStream {
    type Item = Result<CoExpression>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Poll::Ready(Some(Err(Error::Cancelled)));
        }

        match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(item) => Poll::Ready(Some(item)),
            None => {
                self.finished = true;
                if self.cancel.is_cancelled() {
                    Poll::Ready(Some(Err(Error::Cancelled)))
                } else {
                    Poll::Ready(None)
                }
            }
        }
    }
}

impl core::fmt::Debug for CoExpressionStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CoExpressionStream")
            .field("num_units", &self.num_units)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
