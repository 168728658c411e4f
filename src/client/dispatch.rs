//! Reachability state and the pending-request queue.

use crate::reachability::Reachability;
use crate::transport::RawResponse;
use crate::types::ApiTarget;
use crate::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub(crate) type Reply = oneshot::Sender<Result<RawResponse>>;

/// A call parked while the network is unavailable.
pub(crate) struct PendingRequest {
    pub target: Arc<dyn ApiTarget>,
    pub reply: Reply,
    pub enqueued_at: Instant,
}

impl PendingRequest {
    pub fn new(target: Arc<dyn ApiTarget>, reply: Reply) -> Self {
        Self {
            target,
            reply,
            enqueued_at: Instant::now(),
        }
    }

    pub fn is_stale(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.enqueued_at) > ttl)
    }

    /// The consumer dropped its stream; nobody is waiting for the result.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// FIFO bounded queue; the oldest entry is evicted on overflow.
pub(crate) struct PendingQueue {
    items: VecDeque<PendingRequest>,
    max: usize,
}

impl PendingQueue {
    pub fn new(max: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max: max.max(1),
        }
    }

    /// Returns the evicted request, if the queue was full.
    pub fn push(&mut self, req: PendingRequest) -> Option<PendingRequest> {
        let evicted = if self.items.len() >= self.max {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(req);
        evicted
    }

    pub fn take_all(&mut self) -> VecDeque<PendingRequest> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }
}

pub(crate) struct DispatchState {
    pub reachability: Reachability,
    pub pending: PendingQueue,
}

/// What a submission turned into.
pub(crate) enum Admission {
    /// Run it now.
    Send(PendingRequest),
    /// Parked; carries whatever the queue evicted to make room.
    Queued(Option<PendingRequest>),
}

/// Effect of a reachability observation.
pub(crate) enum Transition {
    Unchanged,
    Changed,
    /// Became available; the queue contents to re-submit, oldest first.
    Drain(VecDeque<PendingRequest>),
}

impl DispatchState {
    pub fn new(reachability: Reachability, max_pending: usize) -> Self {
        Self {
            reachability,
            pending: PendingQueue::new(max_pending),
        }
    }

    /// Park the request when offline, otherwise hand it back for sending.
    /// `Unknown` counts as online.
    pub fn admit(&mut self, req: PendingRequest) -> Admission {
        if self.reachability == Reachability::Unavailable {
            Admission::Queued(self.pending.push(req))
        } else {
            Admission::Send(req)
        }
    }

    /// Flip the state and, on a transition to `Available`, take the whole
    /// queue in the same critical section.
    pub fn observe(&mut self, next: Reachability) -> Transition {
        if self.reachability == next {
            return Transition::Unchanged;
        }
        self.reachability = next;
        if next.is_available() {
            Transition::Drain(self.pending.take_all())
        } else {
            Transition::Changed
        }
    }
}
