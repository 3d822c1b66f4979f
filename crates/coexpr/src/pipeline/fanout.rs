//! Correlation fan-out over the frozen gene vector table.

use super::channel::send;
use crate::{
    CoExpression, Error, GeneVectorTable, Result,
    pool::{CorrelationUnit, WorkRequest, WorkerPool},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Validated fan-out for one request.
#[derive(Debug)]
pub(crate) enum CorrelationPlan {
    /// No gene other than the query gene exists; the result set is empty.
    Empty,
    /// At least one unit will be submitted.
    Units {
        table: Arc<GeneVectorTable>,
        query_gene_id: i64,
    },
}

impl CorrelationPlan {
    /// Checks everything that can be checked before the first result exists.
    ///
    /// # Errors
    ///
    /// - [`Error::QueryGeneNotFound`] if other genes exist but the query gene
    ///   has no values.
    /// - [`Error::Computation`] if any vector's length differs from the query
    ///   vector's. Values are appended positionally, so a length mismatch
    ///   means the samples of two genes cannot be lined up.
    pub(crate) fn prepare(table: Arc<GeneVectorTable>, query_gene_id: i64) -> Result<Self> {
        let others = table.len() - usize::from(table.contains_key(&query_gene_id));
        if others == 0 {
            return Ok(Self::Empty);
        }

        let query_len = table
            .get(&query_gene_id)
            .map(Vec::len)
            .ok_or(Error::QueryGeneNotFound {
                gene_id: query_gene_id,
            })?;

        if let Some((gene_id, values)) = table.iter().find(|(_, v)| v.len() != query_len) {
            return Err(Error::Computation {
                reason: format!(
                    "gene {gene_id} has {} values but query gene {query_gene_id} has {query_len}",
                    values.len()
                ),
            });
        }

        Ok(Self::Units {
            table,
            query_gene_id,
        })
    }

    pub(crate) fn num_units(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Units { table, .. } => table.len() - 1,
        }
    }
}

/// Submits one unit per non-query gene to the pool.
///
/// A result slot is reserved before each unit is submitted, so a consumer
/// that stops reading stalls only this dispatcher; the shared workers never
/// wait on it. Every unit carries its permit (and with it a sender clone);
/// this function drops its own sender on return. The result queue therefore
/// closes exactly when the last submitted unit has finished, which is the
/// end-of-stream signal for the encoder.
pub(crate) async fn dispatch_units(
    plan: CorrelationPlan,
    pool: Arc<WorkerPool>,
    result_tx: mpsc::Sender<Result<CoExpression>>,
    cancel: CancellationToken,
) {
    let CorrelationPlan::Units {
        table,
        query_gene_id,
    } = plan
    else {
        return;
    };

    let mut _submitted = 0_usize;
    for &target_gene_id in table.keys() {
        if target_gene_id == query_gene_id {
            continue;
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            permit = result_tx.clone().reserve_owned() => permit.map_err(|_| Error::ChannelError {
                context: "fan-out output closed".to_string(),
            }),
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Fan-out stopped after {_submitted} units: {_e}");
                return;
            }
        };

        let request = WorkRequest::Correlate {
            unit: CorrelationUnit {
                table: Arc::clone(&table),
                query_gene_id,
                target_gene_id,
            },
            permit,
            cancelled: cancel.clone(),
        };

        match pool.send_to_next_worker(request, &cancel).await {
            Ok(()) => _submitted += 1,
            Err(Error::Cancelled) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Fan-out cancelled after {_submitted} units");
                return;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to dispatch unit: {}", e);
                // Best effort: surface the failure to the stream, whose
                // consumer may already be gone.
                let _ = send(&result_tx, Err(e), &cancel, "fan-out").await;
                return;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Dispatched {_submitted} correlation units");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(i64, &[f64])]) -> Arc<GeneVectorTable> {
        Arc::new(
            entries
                .iter()
                .map(|(gene, values)| (*gene, values.to_vec()))
                .collect(),
        )
    }

    #[test]
    fn only_query_gene_is_empty() {
        let plan = CorrelationPlan::prepare(table(&[(1, &[1.0, 2.0])]), 1).unwrap();
        assert!(matches!(plan, CorrelationPlan::Empty));
        assert_eq!(plan.num_units(), 0);
    }

    #[test]
    fn empty_table_is_empty() {
        let plan = CorrelationPlan::prepare(table(&[]), 1).unwrap();
        assert!(matches!(plan, CorrelationPlan::Empty));
    }

    #[test]
    fn missing_query_gene_is_reported() {
        let err = CorrelationPlan::prepare(table(&[(2, &[1.0])]), 1).unwrap_err();
        assert_eq!(err, Error::QueryGeneNotFound { gene_id: 1 });
    }

    #[test]
    fn misaligned_vectors_fail_before_fan_out() {
        let err = CorrelationPlan::prepare(
            table(&[(1, &[1.0, 2.0, 3.0]), (2, &[1.0, 2.0, 3.0]), (3, &[1.0, 2.0])]),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Computation { ref reason } if reason.contains("gene 3")));
    }

    #[test]
    fn counts_one_unit_per_other_gene() {
        let plan = CorrelationPlan::prepare(
            table(&[(1, &[1.0, 2.0]), (2, &[2.0, 1.0]), (3, &[1.0, 1.0])]),
            1,
        )
        .unwrap();
        assert_eq!(plan.num_units(), 2);
    }
}
