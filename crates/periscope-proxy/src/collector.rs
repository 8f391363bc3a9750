//! Transparent stream tees
//!
//! [`ByteTee`] forwards upstream bytes to the client untouched while feeding
//! a copy of each chunk to an observer channel. The observer side either
//! accumulates raw bytes (buffered path) or parses SSE events into a chunk
//! tally (streaming path). When the tee is dropped (client disconnect) or
//! the upstream ends, the channel closes and the observer yields whatever it
//! has, so the record stays useful on partial streams.

use axum::http::HeaderMap;
use axum::http::header::{CONTENT_TYPE, TRANSFER_ENCODING};
use bytes::Bytes;
use eventsource_stream::EventStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Upper bound on collected SSE payloads. Past it, sizes keep counting but
/// payloads are dropped.
const MAX_COLLECTED_CHUNKS: usize = 10_000;

/// A pass-through stream that copies every chunk to an observer channel.
pub struct ByteTee<S> {
    inner: S,
    tap: Option<mpsc::UnboundedSender<Bytes>>,
}

/// Wrap a byte stream, returning the tee and the observer receiver.
pub fn tee<S, E>(stream: S) -> (ByteTee<S>, mpsc::UnboundedReceiver<Bytes>)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let (tap, rx) = mpsc::unbounded_channel();
    (
        ByteTee {
            inner: stream,
            tap: Some(tap),
        },
        rx,
    )
}

impl<S, E> Stream for ByteTee<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(tap) = &self.tap {
                    let _ = tap.send(chunk.clone());
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Upstream error: close the observer side so the tally
                // completes with what was captured.
                self.tap.take();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.tap.take();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Accumulate raw bytes from the observer channel, bounded by `limit`.
pub async fn collect_bytes(mut rx: mpsc::UnboundedReceiver<Bytes>, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Some(chunk) = rx.recv().await {
        if buf.len() + chunk.len() <= limit {
            buf.extend_from_slice(&chunk);
        }
    }
    buf
}

/// Result of observing a streamed SSE response.
#[derive(Debug, Clone, Default)]
pub struct SseTally {
    /// Data-field payloads, one per event, in arrival order.
    pub chunks: Vec<String>,
    /// Milliseconds from request start to the first content payload.
    pub time_to_first_token_ms: Option<i64>,
    /// Total bytes across all content payloads, including dropped ones.
    pub content_bytes: i64,
}

/// Parse SSE events off the observer channel until the upstream ends.
///
/// `data: [DONE]` terminates content tracking; events after it are ignored
/// (forwarding to the client is unaffected). An upstream that ends without
/// `[DONE]` still yields a complete tally.
pub async fn collect_sse(rx: mpsc::UnboundedReceiver<Bytes>, request_start: Instant) -> SseTally {
    let byte_stream =
        UnboundedReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    let mut events = EventStream::new(byte_stream);

    let mut tally = SseTally::default();
    let mut done = false;

    while let Some(event) = events.next().await {
        let Ok(event) = event else { continue };
        if done {
            continue;
        }
        if event.data == "[DONE]" {
            done = true;
            continue;
        }
        if event.data.is_empty() {
            continue;
        }

        if tally.time_to_first_token_ms.is_none() {
            tally.time_to_first_token_ms = Some(request_start.elapsed().as_millis() as i64);
        }
        tally.content_bytes += event.data.len() as i64;
        if tally.chunks.len() < MAX_COLLECTED_CHUNKS {
            tally.chunks.push(event.data);
        }
    }

    tally
}

/// The response declares SSE outright via its Content-Type.
pub fn declares_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_lowercase().starts_with("text/event-stream"))
}

/// Chunked transfer encoding. On its own this is not enough to take the
/// streaming path; the body start must also look like SSE.
pub fn is_chunked_transfer(headers: &HeaderMap) -> bool {
    headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_lowercase().contains("chunked"))
}

/// Whether a body prefix carries an SSE signature: its first non-blank line
/// starts with an SSE field name or a comment marker.
pub fn body_starts_like_sse(prefix: &[u8]) -> bool {
    let text = String::from_utf8_lossy(prefix);
    let start = text.trim_start_matches(['\r', '\n']);
    ["data:", "event:", "id:", "retry:", ":"]
        .iter()
        .any(|field| start.starts_with(field))
}
