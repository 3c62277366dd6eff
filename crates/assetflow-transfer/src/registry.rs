//! Pending/running bookkeeping for transfer requests.
//!
//! The registry owns every `TransferRequest`. Per direction it keeps an
//! ordered pending queue and a running set; a request is in exactly one of
//! the two. A running request always holds a transport handle, a pending
//! one never does.

use std::collections::{HashMap, VecDeque};

use assetflow_core::{AssetId, Direction, Priority};

use crate::reactor::TransportHandle;
use crate::request::{RequestId, TransferRequest};

pub(crate) struct RequestRegistry {
    max_running: usize,
    next_id: RequestId,
    requests: HashMap<RequestId, TransferRequest>,
    pending: [VecDeque<RequestId>; 3],
    running: [Vec<RequestId>; 3],
}

impl RequestRegistry {
    pub fn new(max_running: usize) -> Self {
        Self {
            max_running,
            next_id: 1,
            requests: HashMap::new(),
            pending: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            running: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Insert a new request into its pending queue.
    ///
    /// High priority goes to the front. Texture downloads always sink to the
    /// back; other downloads slot in ahead of any queued texture but keep
    /// FIFO order among themselves. Textures are the least latency-sensitive
    /// requests the server handles.
    pub fn enqueue(&mut self, mut req: TransferRequest) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        req.id = id;

        let idx = req.direction.index();
        let slot = match req.direction {
            Direction::Download if req.asset.kind.is_texture() => self.pending[idx].len(),
            Direction::Download if req.priority == Priority::High => 0,
            Direction::Download => self.pending[idx]
                .iter()
                .position(|qid| {
                    self.requests
                        .get(qid)
                        .map(|r| r.asset.kind.is_texture())
                        .unwrap_or(false)
                })
                .unwrap_or(self.pending[idx].len()),
            _ if req.priority == Priority::High => 0,
            _ => self.pending[idx].len(),
        };

        self.pending[idx].insert(slot, id);
        self.requests.insert(id, req);
        id
    }

    /// First pending request eligible to run, or `None` when the direction
    /// is at capacity or nothing is waiting.
    pub fn find_next(&self, direction: Direction) -> Option<RequestId> {
        if self.running[direction.index()].len() >= self.max_running {
            return None;
        }
        self.pending[direction.index()].front().copied()
    }

    /// Move a pending request into the running set, attaching its transport.
    pub fn promote(&mut self, id: RequestId, transport: TransportHandle) {
        let Some(req) = self.requests.get_mut(&id) else {
            return;
        };
        let idx = req.direction.index();
        // A user-waiting request keeps its original start time across
        // attempts so the deadline covers the whole wait.
        if !(req.user_waiting && req.started_at.is_some()) {
            req.started_at = Some(transport.started_at);
        }
        req.transport = Some(transport);
        self.pending[idx].retain(|&p| p != id);
        self.running[idx].push(id);
    }

    /// Move a request back to the end of its pending queue, discarding any
    /// transport state and counting the attempt.
    pub fn demote(&mut self, id: RequestId) {
        let Some(req) = self.requests.get_mut(&id) else {
            return;
        };
        let idx = req.direction.index();
        if let Some(transport) = req.transport.take() {
            transport.cancel();
        }
        req.retries += 1;
        if !req.user_waiting {
            req.started_at = None;
        }
        self.running[idx].retain(|&r| r != id);
        self.pending[idx].push_back(id);
    }

    /// Remove and return a request, cancelling any running transport.
    pub fn remove(&mut self, id: RequestId) -> Option<TransferRequest> {
        let mut req = self.requests.remove(&id)?;
        let idx = req.direction.index();
        if let Some(transport) = req.transport.take() {
            transport.cancel();
        }
        self.pending[idx].retain(|&p| p != id);
        self.running[idx].retain(|&r| r != id);
        Some(req)
    }

    /// Drain every *pending* request for `asset` in the given directions.
    /// Used to fan one transport's result out to duplicate requests; running
    /// duplicates stay attached to their own transports.
    pub fn drain_pending_matching(
        &mut self,
        directions: &[Direction],
        asset: AssetId,
    ) -> Vec<TransferRequest> {
        let mut out = Vec::new();
        for &direction in directions {
            let idx = direction.index();
            let matching: Vec<RequestId> = self.pending[idx]
                .iter()
                .copied()
                .filter(|id| {
                    self.requests
                        .get(id)
                        .map(|r| r.asset == asset)
                        .unwrap_or(false)
                })
                .collect();
            for id in matching {
                self.pending[idx].retain(|&p| p != id);
                if let Some(req) = self.requests.remove(&id) {
                    out.push(req);
                }
            }
        }
        out
    }

    /// Look a request up by asset, checking the running set first.
    pub fn find(&self, direction: Direction, asset: AssetId) -> Option<RequestId> {
        let idx = direction.index();
        self.running[idx]
            .iter()
            .chain(self.pending[idx].iter())
            .copied()
            .find(|id| {
                self.requests
                    .get(id)
                    .map(|r| r.asset == asset)
                    .unwrap_or(false)
            })
    }

    pub fn get(&self, id: RequestId) -> Option<&TransferRequest> {
        self.requests.get(&id)
    }

    pub fn is_running(&self, id: RequestId) -> bool {
        self.requests
            .get(&id)
            .map(|r| r.is_running())
            .unwrap_or(false)
    }

    pub fn running_ids(&self, direction: Direction) -> Vec<RequestId> {
        self.running[direction.index()].clone()
    }

    /// Running plus pending ids for one direction.
    pub fn ids(&self, direction: Direction) -> Vec<RequestId> {
        let idx = direction.index();
        self.running[idx]
            .iter()
            .chain(self.pending[idx].iter())
            .copied()
            .collect()
    }

    pub fn all_ids(&self) -> Vec<RequestId> {
        self.requests.keys().copied().collect()
    }

    pub fn pending_count(&self, direction: Direction) -> usize {
        self.pending[direction.index()].len()
    }

    pub fn running_count(&self, direction: Direction) -> usize {
        self.running[direction.index()].len()
    }
}
