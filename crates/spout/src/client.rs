//! The spout itself: registration handshake, stream reader loop and the
//! consumer-facing control surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, Response, Url, redirect};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{Credentials, READ_BUFFER_SIZE, SpoutConfig, read_timeout};
use crate::error::{Result, SpoutError};
use crate::message::{self, SpoutMessage};
use crate::queue::{self, EventReceiver, EventSender};

/// Bound on how long `shutdown` waits for the reader task to exit.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Pull-mode listener for an organization's output stream.
///
/// Opening a spout registers with the cloud, which answers with a redirect
/// to a per-connection stream URL. The redirected response doubles as the
/// first live stream; the URL is kept so later reconnects skip the
/// registration round trip. A background task then reads the stream for the
/// lifetime of the instance, reconnecting on any disconnection until
/// [`Spout::shutdown`] is called.
///
/// Messages are buffered in a bounded FIFO queue drained with
/// [`Spout::recv`]. When the consumer falls behind, excess messages are
/// discarded rather than stalling the reader, and every loss is tallied in
/// the drop counter together with undecodable lines and server-reported
/// drops.
#[derive(Debug)]
pub struct Spout {
    rx: EventReceiver,
    dropped: Arc<AtomicU64>,
    stop: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Spout {
    /// Register with the cloud and start streaming.
    ///
    /// Returns once the stream is registered, not once data arrives. On
    /// error no background task is left running.
    pub async fn open(credentials: &Credentials, config: SpoutConfig) -> Result<Self> {
        let timeout = read_timeout();
        // The handshake client follows the registration redirect so the
        // response it lands on is already the first live stream. Reconnects
        // go straight to the recorded URL and must not follow anything.
        let handshake_client = Client::builder().read_timeout(timeout).build()?;
        let stream_client = Client::builder()
            .read_timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        let register_url = format!(
            "{}/output/{}",
            config.base_url.trim_end_matches('/'),
            credentials.oid
        );
        let register_url = Url::parse(&register_url).map_err(|e| {
            SpoutError::configuration(format!("invalid registration URL `{register_url}`: {e}"))
        })?;

        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", credentials.api_key.as_str()),
            ("type", config.data_kind.as_str()),
        ];
        if let Some(inv_id) = config.inv_id.as_deref() {
            params.push(("inv_id", inv_id));
        }
        if let Some(tag) = config.tag.as_deref() {
            params.push(("tag", tag));
        }
        if let Some(cat) = config.cat.as_deref() {
            params.push(("cat", cat));
        }

        let response = handshake_client
            .post(register_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpoutError::setup(format!(
                "registration rejected with HTTP {}",
                response.status()
            )));
        }
        // The final URL only differs from the registration URL if the
        // cloud redirected us to a per-connection stream. Full comparison:
        // a redirect may land on another host under the same path.
        if *response.url() == register_url {
            return Err(SpoutError::setup(
                "registration did not redirect to a stream URL",
            ));
        }
        let stream_url = response.url().clone();
        debug!(url = %stream_url, kind = %config.data_kind, "stream registered");

        let (tx, rx) = queue::bounded(config.max_buffer);
        let dropped = Arc::new(AtomicU64::new(0));
        let stop = CancellationToken::new();

        let reader = ReaderLoop {
            client: stream_client,
            stream_url,
            is_parse: config.is_parse,
            tx,
            dropped: Arc::clone(&dropped),
            stop: stop.clone(),
        };
        let handle = tokio::spawn(reader.run(response));

        Ok(Self {
            rx,
            dropped,
            stop,
            reader: Some(handle),
        })
    }

    /// Wait for the next message in arrival order.
    ///
    /// Keeps yielding buffered messages after shutdown; returns `None` once
    /// the buffer is drained and the reader is gone.
    pub async fn recv(&mut self) -> Option<SpoutMessage> {
        self.rx.recv().await
    }

    /// Take the next message without waiting, if one is buffered.
    pub fn try_recv(&mut self) -> Option<SpoutMessage> {
        self.rx.try_recv()
    }

    /// Running count of messages lost since the last reset: local queue
    /// overflow, undecodable lines and server-reported drops combined.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset the drop counter to zero.
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop receiving data.
    ///
    /// Cancels the reader, which closes the active connection to unblock
    /// any in-flight read, then waits up to a short bound for the task to
    /// exit. Best-effort: an overdue task is left to die on its own.
    pub async fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.reader.take()
            && tokio::time::timeout(SHUTDOWN_WAIT, handle).await.is_err()
        {
            warn!("reader task did not exit within the shutdown wait");
        }
    }
}

impl Drop for Spout {
    fn drop(&mut self) {
        // The reader must not outlive its handle.
        self.stop.cancel();
    }
}

/// State owned by the background reader task.
struct ReaderLoop {
    client: Client,
    stream_url: Url,
    is_parse: bool,
    tx: EventSender,
    dropped: Arc<AtomicU64>,
    stop: CancellationToken,
}

impl ReaderLoop {
    /// Outer per-connection loop. Runs until cancelled, reconnecting to the
    /// recorded stream URL whenever the current connection ends.
    async fn run(self, first: Response) {
        let mut response = Some(first);
        let mut reconnects: u64 = 0;
        while !self.stop.is_cancelled() {
            let current = match response.take() {
                Some(r) => r,
                None => {
                    reconnects += 1;
                    let reconnected = tokio::select! {
                        _ = self.stop.cancelled() => break,
                        r = self.reconnect() => r,
                    };
                    match reconnected {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, reconnects, "reconnect failed, retrying");
                            continue;
                        }
                    }
                }
            };

            debug!(reconnects, "stream started");
            match self.read_stream(current).await {
                Ok(()) => debug!("stream closed"),
                Err(e) if self.stop.is_cancelled() => trace!(error = %e, "stream closed on stop"),
                Err(e) => debug!(error = %e, "stream closed"),
            }
        }
        debug!("reader stopped");
    }

    /// Plain GET on the recorded per-connection URL, no redirects followed.
    async fn reconnect(&self) -> Result<Response> {
        let response = self.client.get(self.stream_url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(SpoutError::setup(format!(
                "stream URL answered HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }

    /// Inner per-line loop over one connection's body.
    ///
    /// Only transport failures escape here; anything wrong with a single
    /// line is absorbed by `process_line` so one bad message can never take
    /// the connection down with it.
    async fn read_stream(&self, response: Response) -> std::io::Result<()> {
        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let mut lines = BufReader::with_capacity(READ_BUFFER_SIZE, body).lines();
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                line = lines.next_line() => match line? {
                    Some(line) => self.process_line(line),
                    None => return Ok(()),
                },
            }
        }
    }

    fn process_line(&self, line: String) {
        // Keep-alive newlines carry nothing.
        if line.is_empty() {
            return;
        }
        if !self.is_parse {
            if self.tx.try_push(SpoutMessage::Raw(line)).is_err() {
                self.count_dropped(1);
            }
            return;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => {
                if message::is_trace(&value) {
                    // Protocol traces are never user data. A `dropped`
                    // trace means the cloud shed `n` messages because we
                    // read too slowly.
                    if let Some(n) = message::trace_dropped(&value) {
                        self.count_dropped(n);
                    }
                } else if self.tx.try_push(SpoutMessage::Json(value)).is_err() {
                    self.count_dropped(1);
                }
            }
            Err(e) => {
                trace!(error = %e, "undecodable line");
                self.count_dropped(1);
            }
        }
    }

    fn count_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reader(is_parse: bool, capacity: usize) -> (ReaderLoop, EventReceiver) {
        let (tx, rx) = queue::bounded(capacity);
        let reader = ReaderLoop {
            client: Client::new(),
            stream_url: Url::parse("http://127.0.0.1:1/stream/x").unwrap(),
            is_parse,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            stop: CancellationToken::new(),
        };
        (reader, rx)
    }

    #[tokio::test]
    async fn test_decoded_line_is_queued() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line(r#"{"a": 1}"#.to_owned());
        assert_eq!(rx.try_recv(), Some(SpoutMessage::Json(json!({"a": 1}))));
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_counts_one_drop() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line("not json".to_owned());
        reader.process_line(r#"{"a": 2}"#.to_owned());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 1);
        // The stream survives the bad line.
        assert_eq!(rx.try_recv(), Some(SpoutMessage::Json(json!({"a": 2}))));
    }

    #[tokio::test]
    async fn test_dropped_trace_adds_count_and_is_filtered() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line(r#"{"__trace": "dropped", "n": 5}"#.to_owned());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 5);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_trace_without_count_still_counts_one() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line(r#"{"__trace": "dropped"}"#.to_owned());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 1);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_keep_alive_trace_is_silent() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line(r#"{"__trace": "keepalive"}"#.to_owned());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 0);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_counts_one_drop_per_line() {
        let (reader, mut rx) = reader(true, 1);
        reader.process_line(r#"{"i": 0}"#.to_owned());
        reader.process_line(r#"{"i": 1}"#.to_owned());
        reader.process_line(r#"{"i": 2}"#.to_owned());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 2);
        assert_eq!(rx.try_recv(), Some(SpoutMessage::Json(json!({"i": 0}))));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_raw_mode_skips_decoding() {
        let (reader, mut rx) = reader(false, 4);
        reader.process_line("definitely not json".to_owned());
        assert_eq!(
            rx.try_recv(),
            Some(SpoutMessage::Raw("definitely not json".to_owned()))
        );
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_keep_alive_line_is_ignored() {
        let (reader, mut rx) = reader(true, 4);
        reader.process_line(String::new());
        assert!(rx.try_recv().is_none());
        assert_eq!(reader.dropped.load(Ordering::Relaxed), 0);
    }
}
