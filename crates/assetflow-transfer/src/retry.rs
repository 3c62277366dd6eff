//! Outcome classification and retry decisions.

use assetflow_core::{Direction, RetryConfig, TransferError, TransferOutcome};

use crate::reactor::TransportResult;

/// Status buckets the service acts on: 200/201/204 succeed, 404 is
/// not-in-database, 502/503 and network errors are transient, anything else
/// is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutcomeClass {
    Success,
    NotFound,
    Transient,
    Permanent,
}

pub(crate) fn classify(direction: Direction, result: &TransportResult) -> OutcomeClass {
    match result {
        TransportResult::NetworkError(_) => OutcomeClass::Transient,
        TransportResult::EmptyDownload => OutcomeClass::NotFound,
        TransportResult::Status(status) => match (direction, *status) {
            (_, 200 | 201 | 204) => OutcomeClass::Success,
            (Direction::Download, 404) => OutcomeClass::NotFound,
            (_, 502 | 503) => OutcomeClass::Transient,
            _ => OutcomeClass::Permanent,
        },
    }
}

/// What to do with one completed transport.
pub(crate) enum RetryDecision {
    /// Requeue at the back of the pending queue; the caller never sees this.
    Requeue,
    Deliver(TransferOutcome),
}

pub(crate) struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        direction: Direction,
        result: &TransportResult,
        retries: u32,
    ) -> RetryDecision {
        match classify(direction, result) {
            OutcomeClass::Success => RetryDecision::Deliver(Ok(())),
            OutcomeClass::NotFound => RetryDecision::Deliver(Err(TransferError::NotFound)),
            OutcomeClass::Permanent => {
                RetryDecision::Deliver(Err(TransferError::Permanent(describe(result))))
            }
            OutcomeClass::Transient if direction.is_upload() => {
                if self.config.allows_retry(retries) {
                    RetryDecision::Requeue
                } else {
                    // A configured retry cap ran out without a definitive
                    // server answer.
                    RetryDecision::Deliver(Err(TransferError::Dropped))
                }
            }
            // Downloads are not requeued; a flaky fetch fails out.
            OutcomeClass::Transient => {
                RetryDecision::Deliver(Err(TransferError::Permanent(describe(result))))
            }
        }
    }
}

fn describe(result: &TransportResult) -> String {
    match result {
        TransportResult::Status(status) => format!("http status {status}"),
        TransportResult::EmptyDownload => "empty download".to_string(),
        TransportResult::NetworkError(e) => e.clone(),
    }
}
