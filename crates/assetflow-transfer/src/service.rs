//! The asset transfer service: submission API and per-tick scheduler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assetflow_core::config::FETCH_TO_FILE_TIMEOUT;
use assetflow_core::{
    AgentId, AssetId, AssetType, CompletionHandler, Direction, Priority, TempAssetRecord,
    TransferConfig, TransferError, TransferOutcome,
};
use assetflow_store::ContentStore;
use uuid::Uuid;

use crate::dispatch::CompletionDispatcher;
use crate::reactor::{HttpReactor, TransportResult};
use crate::registry::RequestRegistry;
use crate::request::{RequestId, TransferRequest};
use crate::retry::{RetryDecision, RetryPolicy};

/// Asynchronous asset transfer service.
///
/// Single-owner and polled: the owning task calls [`tick`](Self::tick) once
/// per heartbeat, and every queue transition and callback invocation happens
/// inside it. Submission methods only enqueue (or fail fast to the
/// callback); nothing touches the network until the next tick.
pub struct AssetTransferService {
    config: TransferConfig,
    content_store: Arc<dyn ContentStore>,
    registry: RequestRegistry,
    reactor: HttpReactor,
    retry: RetryPolicy,
    temp_assets: HashMap<Uuid, TempAssetRecord>,
}

impl AssetTransferService {
    pub fn new(config: TransferConfig, content_store: Arc<dyn ContentStore>) -> reqwest::Result<Self> {
        let registry = RequestRegistry::new(config.max_running_per_direction);
        let retry = RetryPolicy::new(config.retry.clone());
        Ok(Self {
            reactor: HttpReactor::new()?,
            registry,
            retry,
            config,
            content_store,
            temp_assets: HashMap::new(),
        })
    }

    /// Enqueue an upload of an already-populated local asset.
    ///
    /// A missing or zero-length object never reaches the transport layer;
    /// the callback fires with `ZeroSizeAsset` before this returns.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &mut self,
        uuid: Uuid,
        kind: AssetType,
        callback: CompletionHandler,
        temp: bool,
        priority: Priority,
        local: bool,
        requesting_agent: Option<AgentId>,
        user_waiting: bool,
        timeout: Option<Duration>,
    ) {
        let asset = AssetId::new(uuid, kind);

        let size = self.content_store.size(&asset).await.unwrap_or(0);
        if size == 0 {
            tracing::warn!(asset_id = %asset, "Attempt to upload missing or zero-length asset");
            callback(asset, Err(TransferError::ZeroSizeAsset));
            return;
        }

        let direction = if local {
            Direction::LocalUpload
        } else {
            Direction::Upload
        };

        tracing::info!(
            asset_id = %asset,
            direction = direction.as_str(),
            size_bytes = size,
            temp,
            user_waiting,
            "Added to upload queue"
        );

        self.enqueue_request(
            asset,
            direction,
            priority,
            requesting_agent,
            user_waiting,
            timeout,
            callback,
        );
    }

    /// Copy `path` into the content store, then enqueue the upload.
    ///
    /// When `temp` is set the source file is deleted after a successful
    /// copy, so a failed upload needs a fresh file from the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_from_file(
        &mut self,
        path: impl AsRef<Path>,
        uuid: Uuid,
        kind: AssetType,
        callback: CompletionHandler,
        temp: bool,
        priority: Priority,
        user_waiting: bool,
        timeout: Option<Duration>,
    ) {
        let path = path.as_ref();
        let asset = AssetId::new(uuid, kind);

        let data = match tokio::fs::read(path).await {
            Ok(data) if !data.is_empty() => data,
            Ok(_) | Err(_) => {
                tracing::warn!(
                    asset_id = %asset,
                    path = %path.display(),
                    "Upload source file missing or empty"
                );
                callback(asset, Err(TransferError::ZeroSizeAsset));
                return;
            }
        };

        if let Err(e) = self.content_store.write(&asset, &data).await {
            tracing::error!(asset_id = %asset, error = %e, "Failed to copy upload into the content store");
            callback(asset, Err(TransferError::Permanent(format!("store write failed: {e}"))));
            return;
        }

        if temp {
            let _ = tokio::fs::remove_file(path).await;
        }

        self.store(
            uuid,
            kind,
            callback,
            temp,
            priority,
            false,
            None,
            user_waiting,
            timeout,
        )
        .await;
    }

    /// Enqueue a download.
    ///
    /// An already-cached asset completes immediately without touching the
    /// network; a nil UUID fails fast with `NotFound`.
    pub async fn fetch(
        &mut self,
        uuid: Uuid,
        kind: AssetType,
        callback: CompletionHandler,
        priority: Priority,
    ) {
        let asset = AssetId::new(uuid, kind);

        if asset.is_nil() {
            callback(asset, Err(TransferError::NotFound));
            return;
        }

        match self.content_store.size(&asset).await {
            Ok(size) if size > 0 => {
                tracing::debug!(asset_id = %asset, size_bytes = size, "Download satisfied from cache");
                callback(asset, Ok(()));
                return;
            }
            Ok(_) => {
                // A zero-length cache entry is as good as missing.
                let _ = self.content_store.remove(&asset).await;
            }
            Err(_) => {}
        }

        tracing::debug!(asset_id = %asset, "Added to download queue");
        self.enqueue_request(asset, Direction::Download, priority, None, false, None, callback);
    }

    /// One-off download straight to `path`, bypassing the content store.
    ///
    /// Bounded call intended for startup-time fetches; the 30 minute ceiling
    /// is a safety net, not a latency target. The partial file is removed on
    /// any failure.
    pub async fn fetch_to_file(
        &self,
        uuid: Uuid,
        kind: AssetType,
        url: &str,
        path: impl AsRef<Path>,
        progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> TransferOutcome {
        // The uuid and type are not checked against the URL; they are the
        // caller's label for the fetch.
        let asset = AssetId::new(uuid, kind);
        let path = path.as_ref();
        tracing::debug!(asset_id = %asset, url, "Fetching asset to file");

        let result = tokio::time::timeout(
            FETCH_TO_FILE_TIMEOUT,
            self.reactor.download_to_path(url, path, progress),
        )
        .await;

        let outcome = match result {
            Ok(Ok(0)) => {
                tracing::warn!(asset_id = %asset, url, "Fetched file was zero size");
                Err(TransferError::Permanent("empty download".to_string()))
            }
            Ok(Ok(size)) => {
                tracing::info!(asset_id = %asset, url, size_bytes = size, "Fetched asset to file");
                Ok(())
            }
            Ok(Err(TransportResult::Status(404))) => Err(TransferError::NotFound),
            Ok(Err(TransportResult::Status(status))) => {
                Err(TransferError::Permanent(format!("http status {status}")))
            }
            Ok(Err(TransportResult::EmptyDownload)) => Err(TransferError::NotFound),
            Ok(Err(TransportResult::NetworkError(e))) => Err(TransferError::Transient(e)),
            Err(_) => {
                tracing::warn!(url, "Fetch to file timed out");
                Err(TransferError::Transient("fetch timed out".to_string()))
            }
        };

        if outcome.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        outcome
    }

    /// Cancel a pending or running transfer. Returns false if no matching
    /// request exists.
    ///
    /// A running transport is aborted immediately. A request someone is
    /// waiting on completes with `Dropped`; otherwise a running request goes
    /// to the back of its queue and a pending one is dropped outright.
    pub fn cancel(&mut self, direction: Direction, kind: AssetType, uuid: Uuid) -> bool {
        let asset = AssetId::new(uuid, kind);
        let Some(id) = self.registry.find(direction, asset) else {
            return false;
        };

        if self.registry.is_running(id) {
            let user_waiting = self
                .registry
                .get(id)
                .map(|r| r.user_waiting)
                .unwrap_or(false);
            if user_waiting {
                if let Some(req) = self.registry.remove(id) {
                    CompletionDispatcher::deliver(req, Err(TransferError::Dropped));
                }
            } else {
                tracing::info!(
                    asset_id = %asset,
                    direction = direction.as_str(),
                    "Running transfer aborted and placed at the end of the pending queue"
                );
                self.registry.demote(id);
            }
        } else if let Some(req) = self.registry.remove(id) {
            CompletionDispatcher::deliver(req, Err(TransferError::Dropped));
        }

        true
    }

    /// Advance the subsystem one step: promote pending work, observe
    /// completed transports, and enforce deadlines. Non-blocking apart from
    /// local store I/O; call once per heartbeat.
    pub async fn tick(&mut self) {
        self.promote_pending().await;
        self.route_completions();
        self.bump_timed_out_uploads();
        self.expire_stale_downloads();
    }

    /// Abort everything in flight and deliver `Dropped` to every outstanding
    /// request, preserving the exactly-once callback contract at teardown.
    pub fn shutdown(&mut self) {
        for id in self.registry.all_ids() {
            if let Some(req) = self.registry.remove(id) {
                CompletionDispatcher::deliver(req, Err(TransferError::Dropped));
            }
        }
    }

    pub fn pending_count(&self, direction: Direction) -> usize {
        self.registry.pending_count(direction)
    }

    pub fn running_count(&self, direction: Direction) -> usize {
        self.registry.running_count(direction)
    }

    pub fn is_running(&self, direction: Direction, kind: AssetType, uuid: Uuid) -> bool {
        self.registry
            .find(direction, AssetId::new(uuid, kind))
            .map(|id| self.registry.is_running(id))
            .unwrap_or(false)
    }

    /// Record that `asset_id` lives on `host_name` rather than the central
    /// service. Later texture downloads for it are redirected there.
    pub fn register_temp_asset(
        &mut self,
        asset_id: Uuid,
        agent_id: AgentId,
        host_name: impl Into<String>,
    ) {
        if asset_id.is_nil() || agent_id.is_nil() {
            tracing::warn!(%asset_id, %agent_id, "Ignoring temp asset registration with nil ids");
            return;
        }
        self.temp_assets.insert(
            asset_id,
            TempAssetRecord {
                asset_id,
                agent_id,
                host_name: host_name.into(),
            },
        );
    }

    pub fn has_temp_asset(&self, asset_id: &Uuid) -> bool {
        self.temp_assets.contains_key(asset_id)
    }

    pub fn temp_asset_host(&self, asset_id: &Uuid) -> Option<&str> {
        self.temp_assets
            .get(asset_id)
            .map(|record| record.host_name.as_str())
    }

    pub fn temp_asset_agent(&self, asset_id: &Uuid) -> Option<AgentId> {
        self.temp_assets.get(asset_id).map(|record| record.agent_id)
    }

    pub fn forget_temp_asset(&mut self, asset_id: &Uuid) {
        self.temp_assets.remove(asset_id);
    }

    /// Drop every record owned by a disconnecting agent.
    pub fn forget_all_temp_assets_for(&mut self, agent_id: &AgentId) {
        self.temp_assets
            .retain(|_, record| record.agent_id != *agent_id);
    }

    #[allow(clippy::too_many_arguments)]
    fn enqueue_request(
        &mut self,
        asset: AssetId,
        direction: Direction,
        priority: Priority,
        requesting_agent: Option<AgentId>,
        user_waiting: bool,
        timeout: Option<Duration>,
        callback: CompletionHandler,
    ) -> RequestId {
        let timeout = timeout.unwrap_or(match direction {
            Direction::Download => self.config.download_timeout,
            Direction::Upload | Direction::LocalUpload => self.config.upload_timeout,
        });

        self.registry.enqueue(TransferRequest {
            id: 0, // assigned by the registry
            asset,
            direction,
            priority,
            created_at: Instant::now(),
            started_at: None,
            timeout,
            requesting_agent,
            user_waiting,
            retries: 0,
            callback: Some(callback),
            transport: None,
        })
    }

    /// Promote pending requests into free capacity slots, starting their
    /// transports.
    async fn promote_pending(&mut self) {
        for direction in Direction::ALL {
            while let Some(id) = self.registry.find_next(direction) {
                self.start_transport(id, direction).await;
            }
        }
    }

    async fn start_transport(&mut self, id: RequestId, direction: Direction) {
        let Some(req) = self.registry.get(id) else {
            return;
        };
        let asset = req.asset;
        let attempt = req.retries;

        match direction {
            Direction::Download => {
                let url = format!("{}/{}", self.base_url_for(&asset), asset.object_name());
                tracing::info!(asset_id = %asset, url = %url, "Requesting download");
                let transport = self.reactor.start_download(
                    id,
                    attempt,
                    asset,
                    url,
                    Arc::clone(&self.content_store),
                    self.config.download_hard_cap,
                );
                self.registry.promote(id, transport);
            }
            Direction::Upload | Direction::LocalUpload => {
                // Zero-length guard: a zero-byte PUT produces ambiguous
                // server responses, reject before any transport exists.
                let size = self.content_store.size(&asset).await.unwrap_or(0);
                if size == 0 {
                    tracing::warn!(asset_id = %asset, "Rejecting zero size PUT request");
                    if let Some(req) = self.registry.remove(id) {
                        CompletionDispatcher::deliver(req, Err(TransferError::ZeroSizeAsset));
                    }
                    return;
                }

                let compress =
                    direction == Direction::Upload && asset.kind.compress_on_upload();
                let base = if direction == Direction::LocalUpload {
                    &self.config.local_base_url
                } else {
                    &self.config.base_url
                };
                let mut url = format!("{}/{}", base, asset.object_name());
                if compress {
                    url.push_str(".gz");
                }

                tracing::info!(
                    asset_id = %asset,
                    url = %url,
                    size_bytes = size,
                    compress,
                    "Requesting PUT"
                );
                let transport = self.reactor.start_upload(
                    id,
                    attempt,
                    asset,
                    url,
                    Arc::clone(&self.content_store),
                    compress,
                );
                self.registry.promote(id, transport);
            }
        }
    }

    /// Drain completed transports and route each through the retry policy.
    fn route_completions(&mut self) {
        for completion in self.reactor.drive(self.config.pump_budget) {
            let Some(req) = self.registry.get(completion.request) else {
                continue;
            };
            if !req.is_running() || req.retries != completion.attempt {
                // The result raced a bump or cancel; the transport it
                // describes no longer exists.
                continue;
            }

            let direction = req.direction;
            let asset = req.asset;

            match self.retry.decide(direction, &completion.result, req.retries) {
                RetryDecision::Requeue => {
                    tracing::warn!(
                        asset_id = %asset,
                        direction = direction.as_str(),
                        result = ?completion.result,
                        "Re-requesting upload after transient failure"
                    );
                    self.registry.demote(completion.request);
                }
                RetryDecision::Deliver(outcome) => {
                    self.finish_request(completion.request, asset, direction, outcome);
                }
            }
        }
    }

    /// Complete a request from its transport result, fanning the outcome out
    /// to duplicate pending requests for the same asset.
    fn finish_request(
        &mut self,
        id: RequestId,
        asset: AssetId,
        direction: Direction,
        outcome: TransferOutcome,
    ) {
        let Some(req) = self.registry.remove(id) else {
            return;
        };

        if outcome.is_ok() && direction == Direction::LocalUpload {
            let agent = req.requesting_agent.unwrap_or_else(Uuid::nil);
            let host = self.config.host_name.clone();
            self.register_temp_asset(asset.uuid, agent, host);
        }

        // One transport's result completes every other pending request for
        // the same asset; uploads and local uploads share a completion path.
        let siblings = match direction {
            Direction::Download => self
                .registry
                .drain_pending_matching(&[Direction::Download], asset),
            Direction::Upload | Direction::LocalUpload => self
                .registry
                .drain_pending_matching(&[Direction::Upload, Direction::LocalUpload], asset),
        };

        CompletionDispatcher::deliver(req, outcome.clone());
        for sibling in siblings {
            CompletionDispatcher::deliver(sibling, outcome.clone());
        }
    }

    /// A slow peer must not pin the running window: uploads past their
    /// deadline leave the running set every tick.
    fn bump_timed_out_uploads(&mut self) {
        let now = Instant::now();
        for direction in [Direction::Upload, Direction::LocalUpload] {
            for id in self.registry.running_ids(direction) {
                let Some(req) = self.registry.get(id) else {
                    continue;
                };
                if !req.deadline_expired(now) {
                    continue;
                }
                let asset = req.asset;

                if req.user_waiting {
                    tracing::warn!(
                        asset_id = %asset,
                        "Upload deadline passed with a caller waiting; dropping"
                    );
                    if let Some(req) = self.registry.remove(id) {
                        CompletionDispatcher::deliver(req, Err(TransferError::Dropped));
                    }
                } else {
                    tracing::warn!(
                        asset_id = %asset,
                        "Upload request timed out, bumping to the back of the line"
                    );
                    self.registry.demote(id);
                }
            }
        }
    }

    /// Downloads that sat pending or running past the download timeout are
    /// failed out so callers are not left waiting forever.
    fn expire_stale_downloads(&mut self) {
        let now = Instant::now();
        let timeout = self.config.download_timeout;
        for id in self.registry.ids(Direction::Download) {
            let Some(req) = self.registry.get(id) else {
                continue;
            };
            if now.duration_since(req.created_at) <= timeout {
                continue;
            }
            let asset = req.asset;
            tracing::warn!(asset_id = %asset, "Download request timed out");
            if let Some(req) = self.registry.remove(id) {
                CompletionDispatcher::deliver(
                    req,
                    Err(TransferError::Transient("download timed out".to_string())),
                );
            }
        }
    }

    /// Central base URL, unless a temp asset record redirects this texture
    /// to the node that uploaded it.
    fn base_url_for(&self, asset: &AssetId) -> String {
        if asset.kind.is_texture() {
            if let Some(record) = self.temp_assets.get(&asset.uuid) {
                return record.base_url();
            }
        }
        self.config.base_url.clone()
    }
}
