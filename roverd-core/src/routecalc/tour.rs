//! Approximate-TSP touring: nearest-neighbour seed followed by 2-opt
//! improvement. Stable for identical inputs.

use roverd_model::Location;

/// Cap on full 2-opt sweeps; each sweep is O(n^2) and routes of a few
/// thousand points converge well before this.
const MAX_2OPT_SWEEPS: usize = 8;

/// Order `points` into a tour. The input is assumed sorted/deduped by
/// the clustering stage; the first point in sorted order seeds the
/// nearest-neighbour walk so identical inputs produce identical tours.
pub fn tour(points: &[Location]) -> Vec<Location> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut route = nearest_neighbour(points);
    two_opt(&mut route);
    route
}

fn nearest_neighbour(points: &[Location]) -> Vec<Location> {
    let mut remaining: Vec<Location> = points.to_vec();
    let mut route = Vec::with_capacity(remaining.len());
    let mut current = remaining.remove(0);
    route.push(current);

    while !remaining.is_empty() {
        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let d = current.distance_m(candidate);
            // Strict less-than keeps the earliest (lat,lng)-ordered
            // candidate on ties.
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        current = remaining.remove(best);
        route.push(current);
    }
    route
}

fn tour_length(route: &[Location]) -> f64 {
    route
        .windows(2)
        .map(|pair| pair[0].distance_m(&pair[1]))
        .sum()
}

fn two_opt(route: &mut [Location]) {
    let n = route.len();
    for _ in 0..MAX_2OPT_SWEEPS {
        let mut improved = false;
        for i in 0..n.saturating_sub(2) {
            for j in (i + 2)..n {
                let before = segment_cost(route, i, j);
                route[i + 1..=j].reverse();
                let after = segment_cost(route, i, j);
                if after + 1e-9 < before {
                    improved = true;
                } else {
                    route[i + 1..=j].reverse();
                }
            }
        }
        if !improved {
            break;
        }
    }
}

/// Cost of the two edges affected by reversing segment (i+1..=j).
fn segment_cost(route: &[Location], i: usize, j: usize) -> f64 {
    let mut cost = route[i].distance_m(&route[i + 1]);
    if j + 1 < route.len() {
        cost += route[j].distance_m(&route[j + 1]);
    }
    cost
}
