//! Internal message types used for coordinating work across worker tasks.
//!
//! [`WorkRequest`] is the command protocol the
//! [`WorkerPool`](super::WorkerPool) uses to hand work to individual workers:
//! either one correlation unit or a cooperative shutdown.

use crate::{CoExpression, Error, GeneVectorTable, Result, stats::RankCorrelation};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One query/target gene pair, read from the frozen vector table.
#[derive(Debug, Clone)]
pub struct CorrelationUnit {
    pub table: Arc<GeneVectorTable>,
    pub query_gene_id: i64,
    pub target_gene_id: i64,
}

impl CorrelationUnit {
    /// Correlates the target gene's vector against the query gene's vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Computation`] if either vector is missing or the
    /// capability rejects the pair.
    pub fn compute(&self, correlation: &dyn RankCorrelation) -> Result<CoExpression> {
        let query = self.vector(self.query_gene_id)?;
        let target = self.vector(self.target_gene_id)?;
        let (rho, p) = correlation.correlate(target, query)?;

        Ok(CoExpression {
            gene_id: self.target_gene_id.to_string(),
            correlation: rho,
            p_value: p,
        })
    }

    fn vector(&self, gene_id: i64) -> Result<&[f64]> {
        self.table
            .get(&gene_id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Computation {
                reason: format!("gene {gene_id} has no values"),
            })
    }
}

/// A message sent from the worker pool to an individual worker task.
#[derive(Debug)]
pub enum WorkRequest {
    /// Correlate one gene pair and send the outcome through `permit`.
    ///
    /// - `unit`: The gene pair and the table it reads from.
    /// - `permit`: A slot already reserved in the request's result queue, so
    ///   delivering the outcome never waits on the consumer. The queue closes
    ///   once the last permit and sender are gone.
    /// - `cancelled`: Token that allows skipping work for a dead request.
    Correlate {
        unit: CorrelationUnit,
        permit: mpsc::OwnedPermit<Result<CoExpression>>,
        cancelled: CancellationToken,
    },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: One-shot channel for acknowledging that the worker has
    ///   completed its shutdown routine.
    Shutdown { response: oneshot::Sender<()> },
}
