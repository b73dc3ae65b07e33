//! Point-in-polygon tests and bounding-box reduction over the included
//! and excluded polygons of an area.

mod parse;

pub use parse::{parse_geofence_data, parse_text_fence};

use roverd_model::{BoundingBox, Location};

pub type Polygon = Vec<Location>;

/// Ray-cast even-odd containment test. Deterministic, edge ties follow
/// the even-odd rule.
fn polygon_contains(polygon: &[Location], p: &Location) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&polygon[i], &polygon[j]);
        if ((a.lat > p.lat) != (b.lat > p.lat))
            && (p.lng < (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Resolved geofence of one area: included rings plus optional excluded
/// rings, with a pre-computed bounding box over the included set.
#[derive(Debug, Clone)]
pub struct GeofenceHelper {
    include: Vec<Polygon>,
    exclude: Vec<Polygon>,
    bbox: BoundingBox,
}

impl GeofenceHelper {
    pub fn new(include: Vec<Polygon>, exclude: Vec<Polygon>) -> Option<Self> {
        let bbox = BoundingBox::from_points(include.iter().flatten())?;
        Some(GeofenceHelper {
            include,
            exclude,
            bbox,
        })
    }

    /// True iff the point lies in any included polygon and in no
    /// excluded polygon.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        let p = Location::new(lat, lng);
        if !self.bbox.contains(&p) {
            return false;
        }
        let included = self.include.iter().any(|ring| polygon_contains(ring, &p));
        if !included {
            return false;
        }
        !self.exclude.iter().any(|ring| polygon_contains(ring, &p))
    }

    /// Bounding box over the included polygons, used to pre-filter
    /// database queries.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Batch form of [`contains`](Self::contains).
    pub fn filter(&self, points: impl IntoIterator<Item = Location>) -> Vec<Location> {
        points
            .into_iter()
            .filter(|p| self.contains(p.lat, p.lng))
            .collect()
    }

    /// Vertex centroid of the included rings; the leveling route manager
    /// recenters here when its radius search keeps coming up empty.
    pub fn centroid(&self) -> Location {
        let mut lat = 0.0;
        let mut lng = 0.0;
        let mut n = 0usize;
        for p in self.include.iter().flatten() {
            lat += p.lat;
            lng += p.lng;
            n += 1;
        }
        if n == 0 {
            return self.bbox.center();
        }
        Location::new(lat / n as f64, lng / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Polygon {
        vec![
            Location::new(min, min),
            Location::new(min, max),
            Location::new(max, max),
            Location::new(max, min),
        ]
    }

    #[test]
    fn contains_interior_points() {
        let fence = GeofenceHelper::new(vec![square(0.0, 1.0)], vec![]).unwrap();
        assert!(fence.contains(0.5, 0.5));
        assert!(!fence.contains(1.5, 0.5));
        assert!(!fence.contains(-0.1, 0.5));
    }

    #[test]
    fn excluded_polygon_punches_a_hole() {
        let fence =
            GeofenceHelper::new(vec![square(0.0, 1.0)], vec![square(0.4, 0.6)]).unwrap();
        assert!(fence.contains(0.2, 0.2));
        assert!(!fence.contains(0.5, 0.5));
    }

    #[test]
    fn strictly_outside_polygon_vertices_are_outside() {
        // Property 7: every vertex of a strictly-outside polygon tests false.
        let fence = GeofenceHelper::new(vec![square(0.0, 1.0)], vec![]).unwrap();
        for v in square(2.0, 3.0) {
            assert!(!fence.contains(v.lat, v.lng));
        }
        // Interior points near each included vertex test true.
        for v in square(0.0, 1.0) {
            let inward = Location::new(
                v.lat.clamp(0.01, 0.99),
                v.lng.clamp(0.01, 0.99),
            );
            assert!(fence.contains(inward.lat, inward.lng));
        }
    }

    #[test]
    fn filter_is_batch_contains() {
        let fence = GeofenceHelper::new(vec![square(0.0, 1.0)], vec![]).unwrap();
        let kept = fence.filter(vec![
            Location::new(0.5, 0.5),
            Location::new(2.0, 2.0),
            Location::new(0.9, 0.1),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn centroid_of_square_is_center() {
        let fence = GeofenceHelper::new(vec![square(0.0, 1.0)], vec![]).unwrap();
        let c = fence.centroid();
        assert!((c.lat - 0.5).abs() < 1e-9);
        assert!((c.lng - 0.5).abs() < 1e-9);
    }
}
