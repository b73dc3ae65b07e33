//! Persisted route calculation results.
//!
//! The `routefile` column historically stores a JSON array of
//! `"lat,lng"` strings. The codec below keeps that representation on
//! the wire and in the database while the rest of the system works with
//! parsed [`Location`] values.

use crate::error::ModelError;
use crate::ids::RoutecalcId;
use crate::location::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecalcStatus {
    #[default]
    Idle = 0,
    Running = 1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routecalc {
    pub id: RoutecalcId,
    pub routefile: Vec<Location>,
    pub recalc_status: RecalcStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Parse the legacy stringified routefile into coordinates.
pub fn parse_routefile(raw: &str) -> Result<Vec<Location>, ModelError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<String> = serde_json::from_str(raw)?;
    entries.iter().map(|entry| entry.parse()).collect()
}

/// Emit coordinates in the legacy stringified routefile form.
pub fn emit_routefile(route: &[Location]) -> String {
    let entries: Vec<String> = route.iter().map(|loc| loc.to_string()).collect();
    // Serializing a Vec<String> cannot fail.
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_routefile_roundtrip() {
        let route = vec![Location::new(47.5, 8.25), Location::new(-1.0, 100.125)];
        let raw = emit_routefile(&route);
        let parsed = parse_routefile(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!((parsed[0].lat - 47.5).abs() < 1e-6);
        assert!((parsed[1].lng - 100.125).abs() < 1e-6);
    }

    #[test]
    fn empty_routefile_is_empty_route() {
        assert!(parse_routefile("").unwrap().is_empty());
        assert!(parse_routefile("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(parse_routefile(r#"["52.5"]"#).is_err());
        assert!(parse_routefile(r#"["a,b"]"#).is_err());
    }
}
