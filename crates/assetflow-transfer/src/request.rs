//! The transfer request entity.

use std::time::{Duration, Instant};

use assetflow_core::{AgentId, AssetId, CompletionHandler, Direction, Priority};

use crate::reactor::TransportHandle;

/// Registry-assigned request identity; requests live in an id-keyed arena
/// owned by the registry.
pub(crate) type RequestId = u64;

pub(crate) struct TransferRequest {
    pub id: RequestId,
    pub asset: AssetId,
    pub direction: Direction,
    pub priority: Priority,
    pub created_at: Instant,
    /// Set on promotion to running. Preserved across retries while a caller
    /// is waiting, so the deadline covers the sum of all attempts.
    pub started_at: Option<Instant>,
    pub timeout: Duration,
    pub requesting_agent: Option<AgentId>,
    pub user_waiting: bool,
    /// Times this request has been demoted back to pending.
    pub retries: u32,
    /// Taken exactly once at delivery.
    pub callback: Option<CompletionHandler>,
    /// Present only while running.
    pub transport: Option<TransportHandle>,
}

impl TransferRequest {
    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }

    pub fn deadline_expired(&self, now: Instant) -> bool {
        match self.started_at {
            Some(started) => now.duration_since(started) > self.timeout,
            None => false,
        }
    }
}
