//! Geographic coordinates and bounding boxes (WGS84).

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Mean earth radius in meters, used for haversine distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether the coordinate lies within the WGS84 value range and is
    /// representable (no NaN/inf).
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_m(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Total ordering key for stable tie-breaking by `(lat, lng)`.
    pub fn sort_key(&self) -> (i64, i64) {
        // 1e-6 degrees is ~0.11m, well below any scan resolution.
        ((self.lat * 1e6) as i64, (self.lng * 1e6) as i64)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

impl FromStr for Location {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| ModelError::InvalidCoordinate(s.to_string()))?;
        let location = Location {
            lat: lat
                .trim()
                .parse()
                .map_err(|_| ModelError::InvalidCoordinate(s.to_string()))?,
            lng: lng
                .trim()
                .parse()
                .map_err(|_| ModelError::InvalidCoordinate(s.to_string()))?,
        };
        if !location.is_valid() {
            return Err(ModelError::InvalidCoordinate(s.to_string()));
        }
        Ok(location)
    }
}

/// Axis-aligned bounding box used to pre-filter database queries before
/// exact point-in-polygon checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Location>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_lat: first.lat,
            min_lng: first.lng,
            max_lat: first.lat,
            max_lng: first.lng,
        };
        for p in iter {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.min_lng = bbox.min_lng.min(p.lng);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.max_lng = bbox.max_lng.max(p.lng);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &Location) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lng >= self.min_lng && p.lng <= self.max_lng
    }

    pub fn extend(&mut self, other: &BoundingBox) {
        self.min_lat = self.min_lat.min(other.min_lat);
        self.min_lng = self.min_lng.min(other.min_lng);
        self.max_lat = self.max_lat.max(other.max_lat);
        self.max_lng = self.max_lng.max(other.max_lng);
    }

    pub fn center(&self) -> Location {
        Location::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coordinate_pair() {
        let loc: Location = "52.520008, 13.404954".parse().unwrap();
        assert!((loc.lat - 52.520008).abs() < 1e-9);
        assert!((loc.lng - 13.404954).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!("91.0,0.0".parse::<Location>().is_err());
        assert!("nan,0.0".parse::<Location>().is_err());
    }

    #[test]
    fn haversine_is_plausible() {
        // Berlin -> Hamburg is roughly 255km.
        let berlin = Location::new(52.520008, 13.404954);
        let hamburg = Location::new(53.551086, 9.993682);
        let d = berlin.distance_m(&hamburg);
        assert!((230_000.0..280_000.0).contains(&d), "distance {d}");
    }

    #[test]
    fn bbox_covers_all_points() {
        let points = [
            Location::new(0.0, 0.0),
            Location::new(1.0, -1.0),
            Location::new(-0.5, 2.0),
        ];
        let bbox = BoundingBox::from_points(points.iter()).unwrap();
        for p in &points {
            assert!(bbox.contains(p));
        }
        assert!(!bbox.contains(&Location::new(2.0, 0.0)));
    }
}
