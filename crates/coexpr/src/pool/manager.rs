//! Asynchronous worker pool for correlation fan-out.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed set of
//! workers responsible for processing [`WorkRequest`]s. It distributes work
//! using round-robin scheduling and supports coordinated shutdown via a shared
//! [`CancellationToken`].
//!
//! Each worker listens on its own bounded [`mpsc::Receiver`] of capacity 1, so
//! the number of units in flight is bounded by the pool size regardless of how
//! many genes a request fans out to. The pool is shared by every request,
//! which also bounds CPU use across concurrent requests. Units arrive with
//! their result slot already reserved, so a worker never waits on a request
//! whose consumer has stopped reading.

use super::{request::WorkRequest, worker::worker_loop};
use crate::{Error, Result, stats::RankCorrelation};
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A cooperative pool of asynchronous workers that process [`WorkRequest`]s.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Spawns `num_workers` worker tasks on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `num_workers` is zero.
    pub fn spawn(
        num_workers: usize,
        correlation: Arc<dyn RankCorrelation>,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::InvalidRequest {
                reason: "worker pool needs at least one worker".to_string(),
            });
        }

        let shutdown_token = CancellationToken::new();
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            // One queued unit per worker keeps dispatch backpressured by the
            // slowest worker instead of buffering the whole fan-out.
            let (tx, rx) = mpsc::channel(1);
            workers.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&correlation),
                shutdown_token.clone(),
            ));
        }

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            shutdown_timeout,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns a per-request token that is cancelled when the pool shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends a [`WorkRequest`] to the next worker in the pool, waiting for a
    /// free slot.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down (`shutdown_token` was cancelled).
    /// - The request was cancelled while waiting for a slot.
    /// - The worker's channel is closed.
    pub async fn send_to_next_worker(
        &self,
        request: WorkRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        tokio::select! {
            biased;
            () = self.shutdown_token.cancelled() => Err(Error::ServiceShutdown),
            () = cancel.cancelled() => Err(Error::Cancelled),
            sent = worker.send(request) => sent.map_err(|_| Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`], which also cancels every
    ///   request token handed out by [`request_token`](Self::request_token).
    /// - Sends a [`WorkRequest::Shutdown`] to each worker.
    /// - Waits (up to `shutdown_timeout` per worker) for acknowledgements.
    ///
    /// Draining in-flight requests is the caller's job and should happen
    /// before this is invoked.
    pub async fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            // A worker that already observed the token has dropped its
            // receiver, so a failed send is expected here.
            if worker.send(WorkRequest::Shutdown { response: tx }).await.is_ok() {
                shutdown_handles.push((i, rx));
            }
        }

        let shutdown_timeout = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_)) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} exited before acknowledging");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeneVectorTable, pool::CorrelationUnit, stats::Spearman};

    fn pool(num_workers: usize) -> WorkerPool {
        WorkerPool::spawn(num_workers, Arc::new(Spearman), Duration::from_secs(1)).unwrap()
    }

    fn unit(target_gene_id: i64) -> CorrelationUnit {
        CorrelationUnit {
            table: Arc::new(GeneVectorTable::from([
                (1, vec![1.0, 2.0, 3.0]),
                (2, vec![3.0, 2.0, 1.0]),
            ])),
            query_gene_id: 1,
            target_gene_id,
        }
    }

    #[tokio::test]
    async fn rejects_empty_pool() {
        let err = WorkerPool::spawn(0, Arc::new(Spearman), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn round_robin_wraps() {
        let pool = pool(3);
        let picks: Vec<_> = (0..7).map(|_| pool.next_worker_index()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn result_queue_closes_after_last_unit() {
        let pool = pool(2);
        let cancel = pool.request_token();
        let (tx, mut rx) = mpsc::channel(4);

        for _ in 0..3 {
            let request = WorkRequest::Correlate {
                unit: unit(2),
                permit: tx.clone().reserve_owned().await.unwrap(),
                cancelled: cancel.clone(),
            };
            pool.send_to_next_worker(request, &cancel).await.unwrap();
        }
        drop(tx);

        let mut received = 0;
        while let Some(result) = rx.recv().await {
            assert_eq!(result.unwrap().gene_id, "2");
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test]
    async fn refuses_work_after_shutdown() {
        let pool = pool(2);
        let cancel = pool.request_token();
        pool.shutdown().await;

        assert!(pool.is_shutting_down());
        assert!(cancel.is_cancelled());

        let (tx, _rx) = mpsc::channel(1);
        let request = WorkRequest::Correlate {
            unit: unit(2),
            permit: tx.reserve_owned().await.unwrap(),
            cancelled: cancel.clone(),
        };
        assert_eq!(
            pool.send_to_next_worker(request, &cancel).await,
            Err(Error::ServiceShutdown)
        );
    }
}
