//! Server-sent-event pump shared by every adapter.
//!
//! The pump owns the network read: it splits the byte stream into lines,
//! hands each `data:` payload to a backend-specific [`FrameDecoder`], and
//! forwards the resulting deltas over a channel. Each read races the
//! cancellation token and the idle watchdog.

use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolgate_core::{DeltaReceiver, ProviderError, StreamDelta};
use tracing::{debug, trace};

/// Channel depth between the reader task and the agent loop.
const CHANNEL_CAPACITY: usize = 128;

/// Deltas decoded from one frame, plus whether the frame was terminal.
#[derive(Debug, Default)]
pub struct Frame {
    pub deltas: Vec<StreamDelta>,
    pub finished: bool,
}

impl Frame {
    pub fn with(deltas: Vec<StreamDelta>) -> Self {
        Self {
            deltas,
            finished: false,
        }
    }

    pub fn finished() -> Self {
        Self {
            deltas: Vec::new(),
            finished: true,
        }
    }
}

/// Turns one backend's JSON event frames into canonical deltas.
pub trait FrameDecoder: Send + 'static {
    /// Decode the payload of one `data:` line. An `Err` drops the frame.
    fn decode(&mut self, data: &str) -> Result<Frame, serde_json::Error>;

    /// Tool calls still buffered when the stream ends, as final
    /// [`StreamDelta::ToolCall`]s.
    fn flush(&mut self) -> Vec<StreamDelta>;
}

/// Spawn the reader task and return the receiving end.
pub fn spawn_pump<S, B, E, D>(
    provider: &str,
    stream: S,
    mut decoder: D,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> DeltaReceiver
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    D: FrameDecoder,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let provider = provider.to_string();

    tokio::spawn(async move {
        let mut stream = std::pin::pin!(stream);
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(provider = %provider, "Stream cancelled");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
            };

            let bytes = match next {
                Err(_) => {
                    debug!(provider = %provider, "Stream idle timeout");
                    let _ = tx
                        .send(Err(ProviderError::Timeout(format!(
                            "no data received for {} seconds",
                            idle_timeout.as_secs()
                        ))))
                        .await;
                    return;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                        .await;
                    return;
                }
                Ok(Some(Ok(bytes))) => bytes,
            };

            // Chunk boundaries can fall inside a UTF-8 sequence; only whole
            // lines are decoded.
            buffer.extend_from_slice(bytes.as_ref());

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\r', '\n']);

                // Blank separators, comments and `event:` names carry nothing
                // the decoders need; every payload names its own type.
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }

                let frame = match decoder.decode(data) {
                    Ok(frame) => frame,
                    Err(e) => {
                        trace!(provider = %provider, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        continue;
                    }
                };

                for delta in frame.deltas {
                    if cancel.is_cancelled() || tx.send(Ok(delta)).await.is_err() {
                        return;
                    }
                }

                if frame.finished {
                    finish(&tx, &mut decoder, &cancel).await;
                    return;
                }
            }
        }

        // Stream closed without a terminal frame
        finish(&tx, &mut decoder, &cancel).await;
    });

    rx
}

async fn finish<D: FrameDecoder>(
    tx: &mpsc::Sender<Result<StreamDelta, ProviderError>>,
    decoder: &mut D,
    cancel: &CancellationToken,
) {
    for delta in decoder.flush().into_iter().chain([StreamDelta::Done]) {
        if cancel.is_cancelled() || tx.send(Ok(delta)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Feed raw SSE text through the pump in the given chunks.
    pub fn pump_text<D: FrameDecoder>(chunks: &[&str], decoder: D) -> DeltaReceiver {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        spawn_pump(
            "test",
            futures::stream::iter(chunks),
            decoder,
            Duration::from_secs(30),
            CancellationToken::new(),
        )
    }

    /// Like [`pump_text`], but with raw byte chunks.
    pub fn pump_bytes<D: FrameDecoder>(chunks: Vec<Vec<u8>>, decoder: D) -> DeltaReceiver {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = chunks.into_iter().map(Ok).collect();
        spawn_pump(
            "test",
            futures::stream::iter(chunks),
            decoder,
            Duration::from_secs(30),
            CancellationToken::new(),
        )
    }

    pub async fn collect(mut rx: DeltaReceiver) -> Vec<Result<StreamDelta, ProviderError>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }
}
