//! Per-device route pool entries and subroute partitioning.

use roverd_model::Location;
use std::collections::VecDeque;

/// Whether the device's last handout came from the queue or the route;
/// drives the round-robin arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionType {
    #[default]
    Normal,
    Prio,
}

/// State the route manager keeps for one registered device.
#[derive(Debug, Clone, Default)]
pub struct RoutePoolEntry {
    /// The device's share of the route.
    pub subroute: Vec<Location>,
    /// Pending coordinates, refilled from `subroute` on exhaustion.
    pub queue: VecDeque<Location>,
    pub current_pos: Option<Location>,
    /// Completed traversals of the subroute.
    pub rounds: u64,
    pub last_position_type: PositionType,
    pub last_access: i64,
}

impl RoutePoolEntry {
    pub fn new(subroute: Vec<Location>, now: i64) -> Self {
        let queue: VecDeque<Location> = subroute.iter().copied().collect();
        RoutePoolEntry {
            subroute,
            queue,
            current_pos: None,
            rounds: 0,
            last_position_type: PositionType::Normal,
            last_access: now,
        }
    }

    /// Next coordinate of the subroute; rewraps and bumps the round
    /// counter when the queue runs dry.
    pub fn next_route_coord(&mut self) -> Option<Location> {
        if self.queue.is_empty() {
            if self.subroute.is_empty() {
                return None;
            }
            self.rounds += 1;
            self.queue = self.subroute.iter().copied().collect();
        }
        self.queue.pop_front()
    }

    /// Re-inject a coordinate at the head of the device's queue.
    pub fn redo(&mut self, location: Location) {
        self.queue.push_front(location);
    }
}

/// Split `coords` into `parts` equal contiguous slices (the last one
/// takes the remainder). Order within each slice is preserved.
pub fn partition(coords: &[Location], parts: usize) -> Vec<Vec<Location>> {
    if parts == 0 {
        return Vec::new();
    }
    if parts == 1 {
        return vec![coords.to_vec()];
    }
    let chunk = coords.len().div_ceil(parts).max(1);
    let mut slices: Vec<Vec<Location>> =
        coords.chunks(chunk).map(|slice| slice.to_vec()).collect();
    while slices.len() < parts {
        slices.push(Vec::new());
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(n: usize) -> Vec<Location> {
        (0..n).map(|i| Location::new(0.0, i as f64)).collect()
    }

    #[test]
    fn partition_union_equals_input() {
        // Property 3: the union of subroutes equals the route.
        let route = coords(10);
        for parts in 1..=5 {
            let slices = partition(&route, parts);
            assert_eq!(slices.len(), parts);
            let union: Vec<Location> = slices.iter().flatten().copied().collect();
            assert_eq!(union, route);
        }
    }

    #[test]
    fn partition_handles_more_parts_than_coords() {
        let slices = partition(&coords(2), 4);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices.iter().flatten().count(), 2);
    }

    #[test]
    fn exhaustion_increments_round_and_rewraps() {
        let mut entry = RoutePoolEntry::new(coords(2), 0);
        assert_eq!(entry.next_route_coord().unwrap().lng, 0.0);
        assert_eq!(entry.next_route_coord().unwrap().lng, 1.0);
        assert_eq!(entry.rounds, 0);
        // Wrap.
        assert_eq!(entry.next_route_coord().unwrap().lng, 0.0);
        assert_eq!(entry.rounds, 1);
    }

    #[test]
    fn redo_takes_precedence() {
        let mut entry = RoutePoolEntry::new(coords(3), 0);
        entry.next_route_coord();
        entry.redo(Location::new(5.0, 5.0));
        assert_eq!(entry.next_route_coord().unwrap().lat, 5.0);
    }
}
