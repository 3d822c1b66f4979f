//! Cancellation-aware queue operations shared by every stage.

use crate::{Error, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pushes `item`, waiting for capacity unless the request is cancelled first.
pub(crate) async fn send<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancellationToken,
    stage: &'static str,
) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        sent = tx.send(item) => sent.map_err(|_| Error::ChannelError {
            context: format!("{stage} output closed"),
        }),
    }
}

/// Pops the next item; `Ok(None)` once the producer has closed the queue.
pub(crate) async fn recv<T>(
    rx: &mut mpsc::Receiver<T>,
    cancel: &CancellationToken,
) -> Result<Option<T>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        item = rx.recv() => Ok(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_observes_cancellation_while_full() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        send(&tx, 1, &cancel, "test").await.unwrap();

        cancel.cancel();
        assert_eq!(send(&tx, 2, &cancel, "test").await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn send_reports_closed_queue() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);
        let err = send(&tx, 1, &CancellationToken::new(), "test").await.unwrap_err();
        assert!(matches!(err, Error::ChannelError { .. }));
    }

    #[tokio::test]
    async fn recv_observes_cancellation_while_empty() {
        let (_tx, mut rx) = mpsc::channel::<u8>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(recv(&mut rx, &cancel).await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn recv_returns_none_after_close() {
        let (tx, mut rx) = mpsc::channel::<u8>(1);
        drop(tx);
        assert_eq!(recv(&mut rx, &CancellationToken::new()).await, Ok(None));
    }
}
