//! The walker FSM: per-device ordered traversal of walker-areas under
//! algorithm predicates. Advancement is sticky, a device stays in its
//! current walker-area until the predicate declines.

mod predicate;

pub use predicate::{TimeSpec, check_time_period, check_time_till_end, next_activation};

use chrono::{DateTime, Utc};
use roverd_model::{AreaId, WalkerAlgo, WalkerArea, WalkerAreaId};
use tracing::{debug, warn};

/// Route-manager facts the predicates need. The mapping manager
/// implements this over its route managers.
pub trait WalkerContext {
    /// Full subroute traversals of `origin` in the area.
    fn rounds_completed(&self, area_id: AreaId, origin: &str) -> u64;
    /// Coordinates not yet handed out in the area.
    fn remaining_coords(&self, area_id: AreaId) -> usize;
    /// Devices currently placed in the walker-area.
    fn occupancy(&self, walker_area_id: WalkerAreaId) -> usize;
}

/// Per-device progress through a walker. Persisted across reloads as
/// a transient device field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkerCursor {
    pub index: usize,
    /// Unix seconds of first entry into the current walker-area.
    pub entered_at: Option<i64>,
    /// Round counter of the route manager when the area was entered.
    pub rounds_at_entry: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerDecision {
    /// Work the walker-area at this index of the walker.
    Work { index: usize, area_id: AreaId },
    /// No walker-area accepts; sleep until the given unix timestamp
    /// (the nearest future timer/period activation).
    Sleep { until: i64 },
    /// No walker-area accepts and none will by itself become active.
    Park,
}

/// The FSM for one walker definition, shared by every device bound to
/// that walker. All per-device state lives in the caller's cursor.
#[derive(Debug, Clone)]
pub struct WalkerFsm {
    areas: Vec<WalkerArea>,
}

impl WalkerFsm {
    /// `areas` must already be sorted by `order`.
    pub fn new(mut areas: Vec<WalkerArea>) -> Self {
        areas.sort_by_key(|wa| wa.order);
        WalkerFsm { areas }
    }

    pub fn areas(&self) -> &[WalkerArea] {
        &self.areas
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Evaluate the predicate of one walker-area. `entered` carries the
    /// cursor fields when the device is already inside that area.
    fn active(
        &self,
        wa: &WalkerArea,
        origin: &str,
        entered: Option<(i64, u64)>,
        now: DateTime<Utc>,
        ctx: &dyn WalkerContext,
    ) -> bool {
        match wa.algo_type {
            WalkerAlgo::Idle => true,
            WalkerAlgo::Countdown => match entered {
                // Not yet entered: becomes active on entry.
                None => true,
                Some((entered_at, _)) => {
                    let seconds: i64 = wa.algo_value.trim().parse().unwrap_or(0);
                    now.timestamp() < entered_at + seconds
                }
            },
            WalkerAlgo::Round => {
                let target: u64 = wa.algo_value.trim().parse().unwrap_or(0);
                let baseline = entered.map(|(_, rounds)| rounds).unwrap_or_else(|| {
                    ctx.rounds_completed(wa.area_id, origin)
                });
                ctx.rounds_completed(wa.area_id, origin) < baseline + target
            }
            WalkerAlgo::Timer => check_time_till_end(&wa.algo_value, now),
            WalkerAlgo::Period => check_time_period(&wa.algo_value, now),
            WalkerAlgo::Coords => ctx.remaining_coords(wa.area_id) > 0,
        }
    }

    /// Resolve the walker-area a device should work right now, updating
    /// its cursor. Starts at the cursor's index (sticky), walks forward
    /// with wraparound, skips areas at `max_walkers` capacity, and
    /// falls back to a sleep window when every area declines.
    pub fn next_assignment(
        &self,
        origin: &str,
        cursor: &mut WalkerCursor,
        now: DateTime<Utc>,
        ctx: &dyn WalkerContext,
    ) -> WalkerDecision {
        if self.areas.is_empty() {
            warn!(origin, "walker has no areas");
            return WalkerDecision::Park;
        }
        if cursor.index >= self.areas.len() {
            cursor.index = 0;
            cursor.entered_at = None;
        }

        let len = self.areas.len();
        for step in 0..len {
            let i = (cursor.index + step) % len;
            let wa = &self.areas[i];
            let entered = if step == 0 {
                cursor.entered_at.map(|t| (t, cursor.rounds_at_entry))
            } else {
                None
            };

            if !self.active(wa, origin, entered, now, ctx) {
                continue;
            }
            // Capacity only gates entry, not the area we already hold.
            let holding = step == 0 && cursor.entered_at.is_some();
            if !holding {
                if let Some(cap) = wa.max_walkers {
                    if ctx.occupancy(wa.id) >= cap as usize {
                        debug!(
                            origin,
                            walker_area = wa.id.as_i32(),
                            "walker-area at capacity, skipping"
                        );
                        continue;
                    }
                }
                cursor.index = i;
                cursor.entered_at = Some(now.timestamp());
                cursor.rounds_at_entry = ctx.rounds_completed(wa.area_id, origin);
            }
            return WalkerDecision::Work {
                index: i,
                area_id: wa.area_id,
            };
        }

        // Everything declined. Sleep until the nearest future
        // timer/period activation if one exists.
        let wake = self
            .areas
            .iter()
            .filter(|wa| matches!(wa.algo_type, WalkerAlgo::Timer | WalkerAlgo::Period))
            .filter_map(|wa| next_activation(&wa.algo_value, now))
            .min();
        cursor.entered_at = None;
        match wake {
            Some(until) => WalkerDecision::Sleep { until },
            None => WalkerDecision::Park,
        }
    }
}
