//! Server-sent event framing and fragment decoding for streamed replies.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use super::error::LLMError;

/// A single dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Splits a byte stream into SSE events.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
pub struct SseEventStream<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: SseEvent,
    has_pending: bool,
    exhausted: bool,
}

impl<S> SseEventStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pending: SseEvent::default(),
            has_pending: false,
            exhausted: false,
        }
    }

    /// Feed one line; returns an event when a blank line completes one.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_pending();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.pending.event = Some(value.to_string());
                self.has_pending = true;
            }
            "data" => {
                if !self.pending.data.is_empty() {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_pending = true;
            }
            _ => {}
        }
        None
    }

    fn take_pending(&mut self) -> Option<SseEvent> {
        if !self.has_pending {
            return None;
        }
        self.has_pending = false;
        Some(std::mem::take(&mut self.pending))
    }

    fn next_buffered_line(&mut self) -> Option<String> {
        let line_end = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=line_end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl<S> Stream for SseEventStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<SseEvent, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(line) = self.next_buffered_line() {
                if let Some(event) = self.process_line(&line) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            if self.exhausted {
                // Flush a trailing line and event without a final blank line.
                if !self.buffer.is_empty() {
                    let rest = std::mem::take(&mut self.buffer);
                    let line = String::from_utf8_lossy(&rest).into_owned();
                    let _ = self.process_line(line.trim_end_matches('\r'));
                }
                return Poll::Ready(self.take_pending().map(Ok));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => self.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Outcome of decoding one backend event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded {
    Fragment(String),
    /// Final fragment; the stream finishes after yielding it.
    Last(String),
    Skip,
    Finished,
}

/// Backend-specific interpretation of SSE events.
pub(crate) trait SseDecoder: Send + Unpin {
    fn decode(&mut self, event: &SseEvent) -> Result<Decoded, LLMError>;
}

/// Turns SSE events into text fragments.
///
/// Yields `None` only after the decoder reports a clean finish. If the byte
/// stream ends first, a `StreamInterrupted` error is yielded instead. Dropping
/// the stream drops the underlying response body.
pub(crate) struct FragmentStream<S, D> {
    events: SseEventStream<S>,
    decoder: D,
    provider: &'static str,
    done: bool,
}

impl<S, D> FragmentStream<S, D> {
    pub(crate) fn new(inner: S, decoder: D, provider: &'static str) -> Self {
        Self {
            events: SseEventStream::new(inner),
            decoder,
            provider,
            done: false,
        }
    }
}

impl<S, D> Stream for FragmentStream<S, D>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    D: SseDecoder,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.events).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => match self.decoder.decode(&event) {
                    Ok(Decoded::Fragment(text)) if !text.is_empty() => {
                        return Poll::Ready(Some(Ok(text)));
                    }
                    Ok(Decoded::Fragment(_)) | Ok(Decoded::Skip) => continue,
                    Ok(Decoded::Last(text)) => {
                        self.done = true;
                        return Poll::Ready((!text.is_empty()).then_some(Ok(text)));
                    }
                    Ok(Decoded::Finished) => {
                        self.done = true;
                        return Poll::Ready(None);
                    }
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::transport(self.provider, e))));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    tracing::debug!(provider = self.provider, "stream ended without completion marker");
                    return Poll::Ready(Some(Err(LLMError::StreamInterrupted {
                        provider: self.provider,
                    })));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
