use super::channel::send;
use crate::{
    Result,
    source::{BatchStream, ColumnarBatch},
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Drains the source stream into the bounded batch queue.
///
/// Stops after forwarding the first source error, when the request is
/// cancelled, or when the materializer has gone away. Batches are released as
/// soon as they are dropped, so a stopped fetch holds nothing.
pub(crate) async fn fetch_batches(
    mut stream: BatchStream,
    batch_tx: mpsc::Sender<Result<ColumnarBatch>>,
    cancel: CancellationToken,
) {
    let _start = std::time::Instant::now();
    let mut _batches = 0_u64;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(item) = next else { break };

        let failed = item.is_err();
        if send(&batch_tx, item, &cancel, "fetch").await.is_err() || failed {
            break;
        }
        _batches += 1;
    }

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Fetched {_batches} batches from source in {:?}",
        _start.elapsed()
    );
}
