//! Asynchronous asset transfer engine.
//!
//! Moves opaque binary assets (UUID + type tag) between a local
//! [`ContentStore`](assetflow_store::ContentStore) and a remote HTTP asset
//! service. Three independent pipelines (download, upload, local upload)
//! share one reactor; each has its own FIFO pending queue, a capacity-capped
//! running set, and retry/bump semantics for uploads. Object uploads are
//! gzip-streamed in flight.
//!
//! The subsystem is single-owner and polled: construct an
//! [`AssetTransferService`], submit requests, and call
//! [`tick`](AssetTransferService::tick) once per heartbeat. Every request
//! terminates in exactly one completion callback.

pub mod codec;
mod dispatch;
mod reactor;
mod registry;
mod request;
mod retry;
pub mod service;

pub use codec::GzipStreamEncoder;
pub use service::AssetTransferService;
