//! Worker lifecycle and correlation unit processing.
//!
//! Each worker is a long-running async task that receives [`WorkRequest`]s
//! over its own bounded channel, computes one correlation per request on the
//! blocking thread pool, and exits when it is told to shut down, when its
//! channel closes, or when the pool-wide shutdown token is cancelled.

use super::request::{CorrelationUnit, WorkRequest};
use crate::{CoExpression, Error, Result, stats::RankCorrelation};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Asynchronous task representing a single worker's lifecycle.
///
/// # Arguments
/// - `worker_id`: Identifier used for logging.
/// - `rx`: Channel receiver for [`WorkRequest`]s.
/// - `correlation`: Rank-correlation capability shared by all workers.
/// - `shutdown_token`: Cancellation token used to trigger pool-wide shutdown.
pub(crate) async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    correlation: Arc<dyn RankCorrelation>,
    shutdown_token: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        tokio::select! {
            work = rx.recv() => {
                match work {
                    Some(WorkRequest::Correlate { unit, permit, cancelled }) => {
                        handle_correlate(worker_id, unit, permit, cancelled, Arc::clone(&correlation)).await;
                    }
                    Some(WorkRequest::Shutdown { response }) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Worker {worker_id} received shutdown signal");
                        if response.send(()).is_err() {
                            #[cfg(feature = "tracing")]
                            tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                        }
                        break;
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Worker {worker_id} channel closed");
                        break;
                    }
                }
            }
            () = shutdown_token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} shutdown via cancellation token");
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

/// Computes one unit and delivers the outcome through its reserved slot.
///
/// Work for a cancelled request, or one whose consumer is gone, is dropped
/// without computing. The correlation itself runs on the blocking thread
/// pool; the worker waits for it, so the pool size still bounds how many
/// correlations run at once. Delivery is synchronous: a consumer that stops
/// reading can only hold back its own dispatcher, never a worker.
async fn handle_correlate(
    _worker_id: usize,
    unit: CorrelationUnit,
    permit: mpsc::OwnedPermit<Result<CoExpression>>,
    cancelled: CancellationToken,
    correlation: Arc<dyn RankCorrelation>,
) {
    if cancelled.is_cancelled() {
        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {_worker_id} skipping unit for a dead request");
        return;
    }

    let _target_gene_id = unit.target_gene_id;
    let result = tokio::task::spawn_blocking(move || unit.compute(correlation.as_ref()))
        .await
        .unwrap_or_else(|e| {
            Err(Error::Computation {
                reason: format!("correlation task failed: {e}"),
            })
        });

    #[cfg(feature = "tracing")]
    {
        if let Err(e) = &result {
            tracing::warn!("Worker {_worker_id} failed on gene {_target_gene_id}: {e}");
        }
    }

    if cancelled.is_cancelled() {
        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {_worker_id} request cancelled before send");
        return;
    }
    // Sending into a closed queue drops the value; nobody is listening.
    permit.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeneVectorTable, stats::Spearman};

    fn unit(target_gene_id: i64) -> CorrelationUnit {
        CorrelationUnit {
            table: Arc::new(GeneVectorTable::from([
                (1, vec![1.0, 2.0, 3.0]),
                (2, vec![3.0, 2.0, 1.0]),
                (3, vec![1.0, f64::NAN, 3.0]),
            ])),
            query_gene_id: 1,
            target_gene_id,
        }
    }

    #[tokio::test]
    async fn delivers_through_reserved_slot() {
        let (tx, mut rx) = mpsc::channel(1);
        let permit = tx.reserve_owned().await.unwrap();

        handle_correlate(0, unit(2), permit, CancellationToken::new(), Arc::new(Spearman)).await;

        let result = rx.recv().await.unwrap().unwrap();
        assert_eq!(result.gene_id, "2");
        assert!((result.correlation + 1.0).abs() < 1e-12);
        // The permit held the last sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn forwards_computation_errors() {
        let (tx, mut rx) = mpsc::channel(1);
        let permit = tx.reserve_owned().await.unwrap();

        handle_correlate(0, unit(3), permit, CancellationToken::new(), Arc::new(Spearman)).await;

        assert!(matches!(rx.recv().await, Some(Err(Error::Computation { .. }))));
    }

    #[tokio::test]
    async fn skips_cancelled_requests() {
        let (tx, mut rx) = mpsc::channel(1);
        let permit = tx.reserve_owned().await.unwrap();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        handle_correlate(0, unit(2), permit, cancelled, Arc::new(Spearman)).await;

        assert!(rx.recv().await.is_none());
    }
}
