//! Exactly-once completion delivery.

use assetflow_core::TransferOutcome;

use crate::request::TransferRequest;

/// Fires the caller's completion callback and logs the outcome. The request
/// is consumed, so a request cannot be delivered twice.
pub(crate) struct CompletionDispatcher;

impl CompletionDispatcher {
    pub fn deliver(mut request: TransferRequest, outcome: TransferOutcome) {
        match &outcome {
            Ok(()) => tracing::info!(
                asset_id = %request.asset,
                direction = request.direction.as_str(),
                retries = request.retries,
                "Transfer completed"
            ),
            Err(error) => tracing::warn!(
                asset_id = %request.asset,
                direction = request.direction.as_str(),
                retries = request.retries,
                error = %error,
                "Transfer failed"
            ),
        }

        if let Some(callback) = request.callback.take() {
            callback(request.asset, outcome);
        }
    }
}
