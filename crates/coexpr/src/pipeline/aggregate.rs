//! Per-gene vector accumulation and the aggregation barrier.

use super::channel::recv;
use crate::{GeneVectorTable, GeneticAlterationRecord, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Fires once with the frozen table, or with the first upstream error.
pub(crate) type AggregationBarrier = oneshot::Sender<Result<Arc<GeneVectorTable>>>;

/// Builds the gene vector table and signals the barrier exactly once.
///
/// This is the table's only writer. Ownership moves into an `Arc` before the
/// barrier fires, so nothing can mutate the table after correlation starts.
pub(crate) async fn aggregate_vectors(
    mut row_rx: mpsc::Receiver<Result<Vec<GeneticAlterationRecord>>>,
    capacity_hint: usize,
    barrier: AggregationBarrier,
    cancel: CancellationToken,
) {
    let result = build_table(&mut row_rx, capacity_hint, &cancel).await;

    #[cfg(feature = "tracing")]
    {
        match &result {
            Ok(table) => tracing::info!("Aggregation complete: {} genes", table.len()),
            Err(e) => tracing::debug!("Aggregation stopped: {e}"),
        }
    }

    // The orchestrator may have given up (cancelled) already.
    let _ = barrier.send(result.map(Arc::new));
}

async fn build_table(
    row_rx: &mut mpsc::Receiver<Result<Vec<GeneticAlterationRecord>>>,
    capacity_hint: usize,
    cancel: &CancellationToken,
) -> Result<GeneVectorTable> {
    let mut table = GeneVectorTable::new();
    while let Some(records) = recv(row_rx, cancel).await? {
        append_records(&mut table, records?, capacity_hint);
    }
    Ok(table)
}

/// Appends each record's value to its gene's vector, in arrival order.
pub(crate) fn append_records(
    table: &mut GeneVectorTable,
    records: Vec<GeneticAlterationRecord>,
    capacity_hint: usize,
) {
    for record in records {
        table
            .entry(record.gene_id)
            .or_insert_with(|| Vec::with_capacity(capacity_hint))
            .push(record.value);
    }
}
