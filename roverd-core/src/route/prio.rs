//! Min-heap of time-stamped coordinates injected from external events.

use roverd_model::Location;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioEvent {
    pub due_at: i64,
    pub location: Location,
}

impl Eq for PrioEvent {}

impl Ord for PrioEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want earliest due first.
        // Ties break on (lat, lng) for determinism.
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.location.sort_key().cmp(&self.location.sort_key()))
    }
}

impl PartialOrd for PrioEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue overlaying time-sensitive targets on a route.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<PrioEvent>,
    /// Collapse events within this many seconds and ~radius of each
    /// other; the later event wins. None disables collapsing.
    pub clustering_timedelta: Option<i64>,
    /// Events older than now - backlog are dropped on pop. None or 0
    /// keeps everything.
    pub max_backlog: Option<i64>,
    /// Size cap after insertion; 0 = unlimited.
    pub max_clustering: usize,
}

/// Two events count as the same target when within this many meters.
const CLUSTER_DISTANCE_M: f64 = 140.0;

impl PriorityQueue {
    pub fn new(
        clustering_timedelta: Option<i64>,
        max_backlog: Option<i64>,
        max_clustering: usize,
    ) -> Self {
        PriorityQueue {
            heap: BinaryHeap::new(),
            clustering_timedelta,
            max_backlog,
            max_clustering,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert an event, collapsing against existing events inside the
    /// clustering window (latest due time wins) and enforcing the size
    /// cap.
    pub fn push(&mut self, due_at: i64, location: Location) {
        let event = PrioEvent { due_at, location };

        if let Some(window) = self.clustering_timedelta {
            let mut entries: Vec<PrioEvent> = std::mem::take(&mut self.heap).into_vec();
            let mut replaced = false;
            for existing in entries.iter_mut() {
                if (existing.due_at - due_at).abs() <= window
                    && existing.location.distance_m(&location) <= CLUSTER_DISTANCE_M
                {
                    // Latest in time wins within the window.
                    if due_at > existing.due_at {
                        *existing = event;
                    }
                    replaced = true;
                    break;
                }
            }
            if !replaced {
                entries.push(event);
            }
            self.heap = BinaryHeap::from(entries);
        } else {
            self.heap.push(event);
        }

        if self.max_clustering > 0 && self.heap.len() > self.max_clustering {
            // Shed the latest-due events; imminent targets stay.
            let mut entries = std::mem::take(&mut self.heap).into_vec();
            entries.sort_by_key(|e| (e.due_at, e.location.sort_key()));
            entries.truncate(self.max_clustering);
            self.heap = BinaryHeap::from(entries);
        }
    }

    /// Pop the next event that is due at `now`, skipping events that
    /// fell out of the backlog window. Returns None when nothing is due.
    pub fn pop_due(&mut self, now: i64, delay_after_event: i64) -> Option<PrioEvent> {
        let delete_before = match self.max_backlog {
            Some(backlog) if backlog > 0 => now - backlog,
            _ => i64::MIN,
        };

        while let Some(head) = self.heap.peek().copied() {
            if head.due_at < delete_before {
                self.heap.pop();
                tracing::warn!(
                    due_at = head.due_at,
                    "priority event surpassed the backlog window, skipping"
                );
                continue;
            }
            // Hand out once the post-event delay has elapsed.
            if now >= head.due_at + delay_after_event {
                self.heap.pop();
                return Some(head);
            }
            return None;
        }
        None
    }

    /// Snapshot sorted by due time, for status endpoints.
    pub fn snapshot(&self) -> Vec<PrioEvent> {
        let mut entries = self.heap.clone().into_vec();
        entries.sort_by_key(|e| (e.due_at, e.location.sort_key()));
        entries
    }
}
