//! Transfer outcome taxonomy and the completion callback contract.
//!
//! Every request the service accepts terminates in exactly one callback
//! invocation carrying a `TransferOutcome`; no other error path crosses the
//! subsystem boundary.

use thiserror::Error;

use crate::asset::AssetId;

/// The small, closed set of failure kinds a caller can observe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Asset absent server-side (HTTP 404), or a download produced no bytes.
    #[error("asset not found")]
    NotFound,

    /// Connect failure, timeout, or 502/503. Transient upload failures are
    /// requeued and never surfaced; downloads surface this only when they
    /// age out without completing.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// Any other non-2xx outcome.
    #[error("transfer failed: {0}")]
    Permanent(String),

    /// The local asset was missing or zero length; caught before any network
    /// attempt was made.
    #[error("local asset is missing or zero length")]
    ZeroSizeAsset,

    /// The request was cancelled, bumped past its deadline while a caller was
    /// waiting on it, or discarded at shutdown.
    #[error("request dropped")]
    Dropped,
}

impl TransferError {
    /// True for failures the retry policy would requeue rather than surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }
}

pub type TransferOutcome = Result<(), TransferError>;

/// Caller-supplied completion callback, fired exactly once per request.
pub type CompletionHandler = Box<dyn FnOnce(AssetId, TransferOutcome) + Send>;
