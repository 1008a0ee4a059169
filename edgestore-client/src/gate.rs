//! FIFO admission gate bounding how many transfers run at once.
//!
//! A [`Ticket`] is taken synchronously, which fixes the caller's place in the
//! queue. Tickets are admitted strictly in the order they were taken, and
//! only while fewer than `limit` permits are alive. A ticket dropped before
//! admission gives up its place without blocking the ones behind it.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct GateState {
    next_ticket: u64,
    next_admit: u64,
    in_flight: usize,
    abandoned: BTreeSet<u64>,
}

impl GateState {
    fn skip_abandoned(&mut self) {
        while self.abandoned.remove(&self.next_admit) {
            self.next_admit += 1;
        }
    }
}

#[derive(Debug)]
pub struct UploadGate {
    limit: Option<usize>,
    state: Mutex<GateState>,
    notify: Notify,
}

impl UploadGate {
    /// `None` means unbounded; `Some(0)` is treated as one.
    pub fn new(limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            limit: limit.map(|l| l.max(1)),
            state: Mutex::new(GateState::default()),
            notify: Notify::new(),
        })
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn ticket(self: &Arc<Self>) -> Ticket {
        let mut state = self.state.lock();
        let id = state.next_ticket;
        state.next_ticket += 1;
        Ticket {
            gate: Arc::clone(self),
            id,
            admitted: false,
        }
    }

    fn try_admit(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        state.skip_abandoned();
        let has_room = self.limit.map_or(true, |l| state.in_flight < l);
        if state.next_admit != id || !has_room {
            return false;
        }
        state.next_admit += 1;
        state.in_flight += 1;
        state.skip_abandoned();
        true
    }
}

#[derive(Debug)]
pub struct Ticket {
    gate: Arc<UploadGate>,
    id: u64,
    admitted: bool,
}

impl Ticket {
    pub fn position(&self) -> u64 {
        self.id
    }

    /// Wait for this ticket's turn and a free slot.
    pub async fn admit(mut self) -> GatePermit {
        loop {
            let notified = self.gate.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.gate.try_admit(self.id) {
                self.admitted = true;
                // The next ticket may be admissible right away
                self.gate.notify.notify_waiters();
                return GatePermit {
                    gate: Arc::clone(&self.gate),
                };
            }
            notified.await;
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        {
            let mut state = self.gate.state.lock();
            state.abandoned.insert(self.id);
            state.skip_abandoned();
        }
        self.gate.notify.notify_waiters();
    }
}

/// Holds one in-flight slot until dropped.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<UploadGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        {
            let mut state = self.gate.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.gate.notify.notify_waiters();
    }
}
