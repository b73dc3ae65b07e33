//! Bounded handoff queue between the ingest and downstream consumers.
//!
//! When the queue is full, the oldest non-essential record is shed
//! first; essentials (encounters, GMOs) go last.

use parking_lot::Mutex;
use roverd_model::OriginRecord;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::warn;

pub struct TelemetryQueue {
    capacity: usize,
    inner: Mutex<VecDeque<OriginRecord>>,
    notify: Notify,
}

impl TelemetryQueue {
    pub fn new(capacity: usize) -> Self {
        TelemetryQueue {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Enqueue, shedding on overflow. Returns false when a record had
    /// to be dropped to make room.
    pub fn push(&self, record: OriginRecord) -> bool {
        let mut queue = self.inner.lock();
        let mut clean = true;
        if queue.len() >= self.capacity {
            let victim = queue
                .iter()
                .position(|r| !r.record.is_essential())
                .unwrap_or(0);
            let dropped = queue.remove(victim);
            if let Some(dropped) = dropped {
                warn!(
                    origin = %dropped.origin,
                    type_code = dropped.record.type_code,
                    "telemetry queue full, shedding record"
                );
            }
            clean = false;
        }
        queue.push_back(record);
        drop(queue);
        self.notify.notify_one();
        clean
    }

    pub fn try_pop(&self) -> Option<OriginRecord> {
        self.inner.lock().pop_front()
    }

    /// Wait for the next record.
    pub async fn pop(&self) -> OriginRecord {
        loop {
            if let Some(record) = self.try_pop() {
                return record;
            }
            self.notify.notified().await;
        }
    }
}
