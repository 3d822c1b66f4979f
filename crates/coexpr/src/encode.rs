//! Streaming JSON array encoding.
//!
//! The first element is prefixed with `[`, every later one with `,`, and the
//! array is closed with `]\n` once the input ends (`[]\n` if it was empty).
//! Elements are written as they arrive, so nothing is buffered beyond the
//! element being encoded.
//!
//! An error item is passed through and ends the output without the closing
//! bracket. A consumer sees an unterminated array instead of a complete one
//! that silently lacks results.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use core::{
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::Stream;
use serde::Serialize;

/// Wraps a stream of items into a stream of JSON array fragments.
pub fn encode_json_array<S, T>(items: S) -> JsonArrayEncoder<S, T>
where
    S: Stream<Item = Result<T>> + Unpin,
    T: Serialize,
{
    JsonArrayEncoder {
        items,
        state: State::Open,
        _item: PhantomData,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Streaming,
    Done,
}

/// Stream returned by [`encode_json_array`].
#[derive(Debug)]
pub struct JsonArrayEncoder<S, T> {
    items: S,
    state: State,
    _item: PhantomData<fn() -> T>,
}

impl<S, T> JsonArrayEncoder<S, T> {
    pub fn into_inner(self) -> S {
        self.items
    }
}

impl<S, T> Stream for JsonArrayEncoder<S, T>
where
    S: Stream<Item = Result<T>> + Unpin,
    T: Serialize,
{
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state == State::Done {
            return Poll::Ready(None);
        }

        let next = ready!(Pin::new(&mut self.items).poll_next(cx));
        let chunk = match next {
            Some(Ok(item)) => {
                let prefix = if self.state == State::Open { b'[' } else { b',' };
                self.state = State::Streaming;
                encode_element(prefix, &item)
            }
            Some(Err(e)) => {
                self.state = State::Done;
                Err(e)
            }
            None => {
                let tail: &'static [u8] = if self.state == State::Open {
                    b"[]\n"
                } else {
                    b"]\n"
                };
                self.state = State::Done;
                Ok(Bytes::from_static(tail))
            }
        };

        if chunk.is_err() {
            self.state = State::Done;
        }
        Poll::Ready(Some(chunk))
    }
}

fn encode_element<T: Serialize>(prefix: u8, item: &T) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(96);
    buf.put_u8(prefix);
    let mut writer = buf.writer();
    serde_json::to_writer(&mut writer, item).map_err(|e| Error::Computation {
        reason: format!("failed to encode result: {e}"),
    })?;
    Ok(writer.into_inner().freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoExpression;
    use futures::{StreamExt, TryStreamExt, stream};

    fn result(gene_id: i64, correlation: f64) -> CoExpression {
        CoExpression {
            gene_id: gene_id.to_string(),
            correlation,
            p_value: 0.5,
        }
    }

    async fn encode_all(items: Vec<Result<CoExpression>>) -> Vec<Result<Bytes>> {
        encode_json_array(stream::iter(items)).collect().await
    }

    async fn concat(items: Vec<Result<CoExpression>>) -> String {
        let chunks: Vec<Bytes> = encode_json_array(stream::iter(items))
            .try_collect()
            .await
            .unwrap();
        String::from_utf8(chunks.concat()).unwrap()
    }

    #[tokio::test]
    async fn empty_input_is_empty_array() {
        assert_eq!(concat(vec![]).await, "[]\n");
    }

    #[tokio::test]
    async fn single_element() {
        let body = concat(vec![Ok(result(7, 1.0))]).await;
        assert!(body.starts_with("[{") && body.ends_with("}]\n"), "{body}");
        let parsed: Vec<CoExpression> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, vec![result(7, 1.0)]);
    }

    #[tokio::test]
    async fn many_elements_keep_order_and_separators() {
        let items: Vec<_> = (0..50).map(|g| Ok(result(g, -0.25))).collect();
        let body = concat(items).await;
        let parsed: Vec<CoExpression> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 50);
        assert_eq!(parsed[49].gene_id, "49");
        assert_eq!(body.matches("},{").count(), 49);
    }

    #[tokio::test]
    async fn error_truncates_without_closing_bracket() {
        let err = Error::Computation {
            reason: "boom".to_string(),
        };
        let chunks = encode_all(vec![Ok(result(1, 0.0)), Err(err.clone()), Ok(result(2, 0.0))]).await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].as_ref().unwrap().starts_with(b"[{"));
        assert_eq!(chunks[1], Err(err));
    }

    #[tokio::test]
    async fn error_first_yields_no_bytes() {
        let chunks = encode_all(vec![Err(Error::Cancelled)]).await;
        assert_eq!(chunks, vec![Err(Error::Cancelled)]);
    }
}
