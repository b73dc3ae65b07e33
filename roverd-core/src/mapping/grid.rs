//! Init-mode coordinate lattice over a fence bounding box.

use roverd_model::{BoundingBox, Location};

const EARTH_CIRCUMFERENCE_M: f64 = 40_075_017.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Cell edge length in metres for a grid level; level 15 is roughly
/// 1.2 km, each level halves it.
pub fn cell_edge_m(level: u8) -> f64 {
    EARTH_CIRCUMFERENCE_M / f64::from(level.clamp(1, 30)).exp2()
}

/// Regular lattice over `bbox` with one point per `level`-sized cell.
/// Longitude spacing widens with latitude so cells stay near-square.
pub fn lattice(bbox: &BoundingBox, level: u8) -> Vec<Location> {
    let edge_m = cell_edge_m(level);
    let lat_step = edge_m / METERS_PER_DEGREE_LAT;
    let mut points = Vec::new();

    let mut lat = bbox.min_lat;
    while lat <= bbox.max_lat {
        let shrink = lat.to_radians().cos().abs().max(0.01);
        let lng_step = lat_step / shrink;
        let mut lng = bbox.min_lng;
        while lng <= bbox.max_lng {
            points.push(Location::new(lat, lng));
            lng += lng_step;
        }
        lat += lat_step;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_halves_per_level() {
        let l15 = cell_edge_m(15);
        let l16 = cell_edge_m(16);
        assert!((l15 / l16 - 2.0).abs() < 1e-9);
        assert!(l15 > 1_000.0 && l15 < 1_500.0);
    }

    #[test]
    fn lattice_covers_box() {
        let bbox = BoundingBox {
            min_lat: 0.0,
            min_lng: 0.0,
            max_lat: 0.1,
            max_lng: 0.1,
        };
        let points = lattice(&bbox, 15);
        assert!(!points.is_empty());
        assert!(points.iter().all(|p| bbox.contains(p)));
        // Finer level means more points.
        assert!(lattice(&bbox, 16).len() > points.len());
    }
}
