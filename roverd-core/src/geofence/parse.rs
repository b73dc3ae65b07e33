//! Fence record parsing: the legacy named-block text format and the
//! JSON ring-list format.

use super::Polygon;
use crate::error::{CoreError, Result};
use roverd_model::{Geofence, GeofenceKind, Location};

/// Parse the legacy text format:
///
/// ```text
/// [downtown]
/// 52.520008,13.404954
/// 52.521000,13.406000
/// ...
/// [suburb]
/// ...
/// ```
///
/// Blank lines are skipped; a fence without a leading header is treated
/// as a single unnamed polygon.
pub fn parse_text_fence(raw: &str) -> Result<Vec<Polygon>> {
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut current: Polygon = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            if !current.is_empty() {
                polygons.push(std::mem::take(&mut current));
            }
            continue;
        }
        let location: Location = line
            .parse()
            .map_err(|_| CoreError::ConfigInvalid(format!("bad fence coordinate: {line}")))?;
        current.push(location);
    }
    if !current.is_empty() {
        polygons.push(current);
    }
    if polygons.is_empty() {
        return Err(CoreError::ConfigInvalid("fence contains no polygons".into()));
    }
    Ok(polygons)
}

fn parse_json_fence(raw: &str) -> Result<Vec<Polygon>> {
    let rings: Vec<Vec<[f64; 2]>> = serde_json::from_str(raw)?;
    let polygons: Vec<Polygon> = rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .map(|[lat, lng]| Location::new(lat, lng))
                .collect()
        })
        .collect();
    if polygons.iter().any(|ring: &Polygon| ring.len() < 3) {
        return Err(CoreError::ConfigInvalid(
            "fence ring with fewer than 3 vertices".into(),
        ));
    }
    Ok(polygons)
}

/// Parse a persisted geofence record into polygon rings.
pub fn parse_geofence_data(fence: &Geofence) -> Result<Vec<Polygon>> {
    match fence.kind {
        GeofenceKind::Polygon => parse_text_fence(&fence.data),
        GeofenceKind::Geojson => parse_json_fence(&fence.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roverd_model::GeofenceId;

    #[test]
    fn parses_named_blocks() {
        let raw = "[a]\n0.0,0.0\n0.0,1.0\n1.0,1.0\n[b]\n5.0,5.0\n5.0,6.0\n6.0,6.0\n";
        let polygons = parse_text_fence(raw).unwrap();
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].len(), 3);
    }

    #[test]
    fn parses_headerless_fence() {
        let raw = "0.0,0.0\n0.0,1.0\n1.0,1.0\n";
        let polygons = parse_text_fence(raw).unwrap();
        assert_eq!(polygons.len(), 1);
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_text_fence("[a]\nnot-a-coord\n").is_err());
        assert!(parse_text_fence("").is_err());
    }

    #[test]
    fn parses_json_rings() {
        let fence = Geofence {
            id: GeofenceId(1),
            name: "json".into(),
            kind: GeofenceKind::Geojson,
            data: "[[[0.0,0.0],[0.0,1.0],[1.0,1.0]]]".into(),
        };
        let polygons = parse_geofence_data(&fence).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!((polygons[0][2].lat - 1.0).abs() < 1e-9);
    }
}
