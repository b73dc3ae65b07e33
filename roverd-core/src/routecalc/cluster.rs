//! Disc-cover clustering: reduce a coordinate set by covering it with
//! discs of radius `max_radius` that each absorb at most
//! `max_coords_within_radius` points.

use roverd_model::Location;

/// Greedy disc cover with stable `(lat, lng)` tie-breaking: points are
/// processed in sorted order, each uncovered point opens a disc at its
/// own position and absorbs up to `max_count - 1` later uncovered
/// neighbours within `max_radius` meters.
pub fn cluster(points: &[Location], max_radius: f64, max_count: usize) -> Vec<Location> {
    if max_radius <= 0.0 || max_count <= 1 {
        return sorted_dedup(points);
    }

    let sorted = sorted_dedup(points);
    let mut covered = vec![false; sorted.len()];
    let mut centers = Vec::new();

    for i in 0..sorted.len() {
        if covered[i] {
            continue;
        }
        covered[i] = true;
        let center = sorted[i];
        let mut absorbed = 1usize;
        for j in (i + 1)..sorted.len() {
            if absorbed >= max_count {
                break;
            }
            if !covered[j] && center.distance_m(&sorted[j]) <= max_radius {
                covered[j] = true;
                absorbed += 1;
            }
        }
        centers.push(center);
    }

    centers
}

/// Stable sort by (lat, lng) with exact duplicates removed.
pub fn sorted_dedup(points: &[Location]) -> Vec<Location> {
    let mut sorted: Vec<Location> = points.to_vec();
    sorted.sort_by_key(|p| p.sort_key());
    sorted.dedup_by_key(|p| p.sort_key());
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_never_grows_the_set() {
        let points: Vec<Location> = (0..50)
            .map(|i| Location::new(i as f64 * 0.0001, 0.0))
            .collect();
        let reduced = cluster(&points, 100.0, 10);
        assert!(reduced.len() <= points.len());
        assert!(!reduced.is_empty());
    }

    #[test]
    fn tight_points_collapse_to_one_disc() {
        // ~11m apart, radius 100m: one disc covers all of them.
        let points: Vec<Location> = (0..5)
            .map(|i| Location::new(i as f64 * 0.0001, 0.0))
            .collect();
        let reduced = cluster(&points, 100.0, 10);
        assert_eq!(reduced.len(), 1);
    }

    #[test]
    fn max_count_limits_absorption() {
        let points: Vec<Location> = (0..6)
            .map(|i| Location::new(i as f64 * 0.00001, 0.0))
            .collect();
        let reduced = cluster(&points, 100.0, 3);
        assert_eq!(reduced.len(), 2);
    }

    #[test]
    fn deterministic_for_shuffled_input() {
        let points = vec![
            Location::new(0.5, 0.5),
            Location::new(0.1, 0.9),
            Location::new(0.9, 0.1),
            Location::new(0.3, 0.3),
        ];
        let mut reversed = points.clone();
        reversed.reverse();
        assert_eq!(cluster(&points, 50.0, 5), cluster(&reversed, 50.0, 5));
    }

    #[test]
    fn duplicates_are_removed() {
        let points = vec![Location::new(1.0, 1.0); 4];
        assert_eq!(cluster(&points, 0.0, 1).len(), 1);
    }
}
