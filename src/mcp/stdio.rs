//! Stdio wrappers that let in-flight requests finish after stdin closes.
//!
//! The SDK stops serving as soon as its input reaches end of file, so a
//! client that writes its last request and closes the pipe would never see
//! the reply. [`InFlight`] watches the JSON-RPC lines going each way;
//! [`DrainingReader`] reports end of file only once every request read so
//! far has been answered, or the drain timeout has passed.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;

/// Longest line tracked; longer partial lines are discarded
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// How long a closed stdin waits for outstanding replies
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Lines {
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    pending: HashSet<String>,
}

/// Requests read but not yet answered, keyed by their JSON-encoded id
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    lines: Arc<Mutex<Lines>>,
    answered: Arc<Notify>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Lines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn observe_inbound(&self, bytes: &[u8]) {
        let mut lines = self.lock();
        let Lines {
            inbound, pending, ..
        } = &mut *lines;
        for message in complete_messages(inbound, bytes) {
            if let Some(id) = request_key(&message) {
                pending.insert(id);
            }
        }
    }

    fn observe_outbound(&self, bytes: &[u8]) {
        let mut lines = self.lock();
        let Lines {
            outbound, pending, ..
        } = &mut *lines;
        for message in complete_messages(outbound, bytes) {
            if let Some(id) = response_key(&message) {
                pending.remove(&id);
            }
        }
        if pending.is_empty() {
            self.answered.notify_waiters();
        }
    }

    /// Resolves once no request is waiting for its reply
    pub async fn drained(&self) {
        loop {
            let notified = self.answered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().pending.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Append `bytes` and take every complete newline-terminated message out of `buffer`
fn complete_messages(buffer: &mut Vec<u8>, bytes: &[u8]) -> Vec<Value> {
    buffer.extend_from_slice(bytes);
    let mut messages = Vec::new();
    while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=end).collect();
        match serde_json::from_slice::<Value>(&line) {
            Ok(Value::Array(batch)) => messages.extend(batch),
            Ok(message) => messages.push(message),
            Err(_) => {}
        }
    }
    if buffer.len() > MAX_MESSAGE_BYTES {
        buffer.clear();
    }
    messages
}

fn message_id(message: &Value) -> Option<String> {
    message
        .get("id")
        .filter(|id| !id.is_null())
        .map(Value::to_string)
}

fn request_key(message: &Value) -> Option<String> {
    message.get("method")?;
    message_id(message)
}

fn response_key(message: &Value) -> Option<String> {
    if message.get("method").is_some() {
        return None;
    }
    message_id(message)
}

/// Reader that holds back end of file until [`InFlight`] drains
pub struct DrainingReader<R> {
    inner: R,
    in_flight: InFlight,
    timeout: Duration,
    drain: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    finished: bool,
}

impl<R> DrainingReader<R> {
    pub fn new(inner: R, in_flight: InFlight, timeout: Duration) -> Self {
        Self {
            inner,
            in_flight,
            timeout,
            drain: None,
            finished: false,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DrainingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.drain.is_none() {
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            if buf.filled().len() > before {
                this.in_flight.observe_inbound(&buf.filled()[before..]);
                return Poll::Ready(Ok(()));
            }

            let in_flight = this.in_flight.clone();
            let timeout = this.timeout;
            tracing::debug!(pending = in_flight.pending(), "Stdin closed; draining replies");
            this.drain = Some(Box::pin(async move {
                if tokio::time::timeout(timeout, in_flight.drained()).await.is_err() {
                    tracing::warn!(
                        pending = in_flight.pending(),
                        "Gave up waiting for in-flight requests"
                    );
                }
            }));
        }

        if let Some(drain) = this.drain.as_mut() {
            ready!(drain.as_mut().poll(cx));
        }
        this.drain = None;
        this.finished = true;
        Poll::Ready(Ok(()))
    }
}

/// Writer that marks requests answered as their replies go out
pub struct TrackingWriter<W> {
    inner: W,
    in_flight: InFlight,
}

impl<W> TrackingWriter<W> {
    pub fn new(inner: W, in_flight: InFlight) -> Self {
        Self { inner, in_flight }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TrackingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.in_flight.observe_outbound(&buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
