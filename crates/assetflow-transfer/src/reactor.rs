//! HTTP transport execution.
//!
//! One reactor per service instance owns the shared HTTP clients and the
//! completion channel (the subsystem-wide multi-transfer context). Transfers
//! run as spawned tasks; the service observes their results only when it
//! drains the channel during a tick, so callbacks never fire outside the
//! owning task's heartbeat.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assetflow_core::AssetId;
use assetflow_store::ContentStore;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::{GzipStreamEncoder, INPUT_CHUNK_SIZE};
use crate::request::RequestId;

/// Connect timeout for individual transports.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw result of one transport attempt.
#[derive(Debug, Clone)]
pub(crate) enum TransportResult {
    /// The server answered with this final HTTP status.
    Status(u16),
    /// A 200 download that produced no bytes; the asset is treated as not
    /// present server-side.
    EmptyDownload,
    /// Connect failure, timeout, or mid-stream I/O error.
    NetworkError(String),
}

/// Completion notification for one transport attempt.
pub(crate) struct Completion {
    pub request: RequestId,
    /// Attempt number at spawn time. A mismatch means the request was bumped
    /// or cancelled while this result was in flight; the result describes a
    /// transport that no longer exists and must be ignored.
    pub attempt: u32,
    pub result: TransportResult,
}

/// Non-owning reference to a running transfer task. Cancelling aborts the
/// task promptly; the task cleans up its scratch state before exiting.
pub(crate) struct TransportHandle {
    cancel: CancellationToken,
    pub started_at: Instant,
}

impl TransportHandle {
    pub fn new(cancel: CancellationToken, started_at: Instant) -> Self {
        Self { cancel, started_at }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub(crate) struct HttpReactor {
    /// Client for downloads and plain uploads.
    client: reqwest::Client,
    /// Client for chunked compressed uploads; bypasses any configured proxy
    /// because transparent proxies and chunked transfer encoding interact
    /// badly.
    streaming_client: reqwest::Client,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

/// Shared client settings. Idle connections are never kept, so a long-lived
/// session cannot pin stale DNS through a reused socket.
fn base_client() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(0)
}

impl HttpReactor {
    pub fn new() -> reqwest::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            client: base_client().build()?,
            streaming_client: base_client().no_proxy().build()?,
            tx,
            rx,
        })
    }

    /// Drain at most `budget` completion notifications without blocking.
    pub fn drive(&mut self, budget: usize) -> Vec<Completion> {
        let mut out = Vec::new();
        while out.len() < budget {
            match self.rx.try_recv() {
                Ok(completion) => out.push(completion),
                Err(_) => break,
            }
        }
        out
    }

    /// Start a download into the content store.
    ///
    /// Bytes land under a scratch id and are renamed over the final id only
    /// after the transfer commits, so concurrent readers never observe a
    /// partial object.
    pub fn start_download(
        &self,
        request: RequestId,
        attempt: u32,
        asset: AssetId,
        url: String,
        store: Arc<dyn ContentStore>,
        hard_cap: u64,
    ) -> TransportHandle {
        let cancel = CancellationToken::new();
        let handle = TransportHandle::new(cancel.clone(), Instant::now());
        let client = self.client.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let scratch = AssetId::new(Uuid::new_v4(), asset.kind);

            let outcome = tokio::select! {
                outcome = download_to_scratch(&client, &url, &scratch, store.as_ref(), hard_cap) => outcome,
                _ = cancel.cancelled() => {
                    let _ = store.remove(&scratch).await;
                    return;
                }
            };

            let result = match outcome {
                Ok(received) if received > 0 => match store.rename(&scratch, &asset).await {
                    Ok(()) => {
                        tracing::info!(asset_id = %asset, size_bytes = received, "Download complete");
                        TransportResult::Status(200)
                    }
                    Err(e) => {
                        let _ = store.remove(&scratch).await;
                        TransportResult::NetworkError(format!("store commit failed: {e}"))
                    }
                },
                Ok(_) => {
                    tracing::warn!(asset_id = %asset, url = %url, "Download was zero size");
                    let _ = store.remove(&scratch).await;
                    TransportResult::EmptyDownload
                }
                Err(failure) => {
                    let _ = store.remove(&scratch).await;
                    failure
                }
            };

            let _ = tx.send(Completion {
                request,
                attempt,
                result,
            });
        });

        handle
    }

    /// Start an upload from the content store. Compressed uploads stream
    /// through the gzip encoder with a chunked body; plain uploads send the
    /// object bytes with an exact content length.
    pub fn start_upload(
        &self,
        request: RequestId,
        attempt: u32,
        asset: AssetId,
        url: String,
        store: Arc<dyn ContentStore>,
        compress: bool,
    ) -> TransportHandle {
        let cancel = CancellationToken::new();
        let handle = TransportHandle::new(cancel.clone(), Instant::now());
        let client = if compress {
            self.streaming_client.clone()
        } else {
            self.client.clone()
        };
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                result = run_upload(&client, &asset, &url, store, compress) => result,
                _ = cancel.cancelled() => return,
            };

            let _ = tx.send(Completion {
                request,
                attempt,
                result,
            });
        });

        handle
    }

    /// One-off download straight to a filesystem path, bypassing the store.
    /// Returns the byte count on success.
    pub async fn download_to_path(
        &self,
        url: &str,
        path: &Path,
        mut progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> Result<u64, TransportResult> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportResult::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(TransportResult::Status(status));
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| TransportResult::NetworkError(format!("failed to open {}: {e}", path.display())))?;

        let mut received: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportResult::NetworkError(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| TransportResult::NetworkError(e.to_string()))?;
            received += chunk.len() as u64;
            if let Some(callback) = progress.as_deref_mut() {
                callback(received);
            }
        }

        file.flush()
            .await
            .map_err(|e| TransportResult::NetworkError(e.to_string()))?;

        Ok(received)
    }
}

async fn download_to_scratch(
    client: &reqwest::Client,
    url: &str,
    scratch: &AssetId,
    store: &dyn ContentStore,
    hard_cap: u64,
) -> Result<u64, TransportResult> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TransportResult::NetworkError(e.to_string()))?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(TransportResult::Status(status));
    }

    // Declared lengths are not always truthful: the local object grows
    // monotonically and never past min(declared, hard cap).
    let declared = response.content_length();
    let limit = declared.map_or(hard_cap, |len| len.min(hard_cap));

    let mut received: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TransportResult::NetworkError(e.to_string()))?
    {
        let room = limit.saturating_sub(received);
        if room == 0 {
            break;
        }
        let take = (chunk.len() as u64).min(room) as usize;
        received = store
            .append(scratch, &chunk[..take])
            .await
            .map_err(|e| TransportResult::NetworkError(format!("store write failed: {e}")))?;
    }

    Ok(received)
}

async fn run_upload(
    client: &reqwest::Client,
    asset: &AssetId,
    url: &str,
    store: Arc<dyn ContentStore>,
    compress: bool,
) -> TransportResult {
    let request = if compress {
        let reader = match store.reader(asset).await {
            Ok(reader) => reader,
            Err(e) => return TransportResult::NetworkError(format!("store read failed: {e}")),
        };
        // Chunked body; the compressed size is unknown until the stream ends,
        // so no Content-Length is sent.
        client
            .put(url)
            .body(reqwest::Body::wrap_stream(gzip_stream(reader)))
    } else {
        let data = match store.read(asset).await {
            Ok(data) => data,
            Err(e) => return TransportResult::NetworkError(format!("store read failed: {e}")),
        };
        client.put(url).body(data)
    };

    match request.send().await {
        Ok(response) => TransportResult::Status(response.status().as_u16()),
        Err(e) => TransportResult::NetworkError(e.to_string()),
    }
}

struct GzipStreamState {
    reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    encoder: Option<GzipStreamEncoder>,
}

/// Adapt a store reader into a stream of gzip-encoded chunks, pulling raw
/// input in fixed-size pieces until the reader is exhausted.
fn gzip_stream(
    reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send {
    let state = GzipStreamState {
        reader,
        encoder: Some(GzipStreamEncoder::new()),
    };

    futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if state.encoder.is_none() {
                return Ok(None);
            }

            let mut buf = [0u8; INPUT_CHUNK_SIZE];
            let n = state.reader.read(&mut buf).await?;

            if n == 0 {
                let tail = match state.encoder.take() {
                    Some(encoder) => encoder.finish()?,
                    None => return Ok(None),
                };
                if tail.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((Bytes::from(tail), state)));
            }

            let out = match state.encoder.as_mut() {
                Some(encoder) => encoder.feed(&buf[..n])?,
                None => return Ok(None),
            };
            if !out.is_empty() {
                return Ok(Some((Bytes::from(out), state)));
            }
        }
    })
}
