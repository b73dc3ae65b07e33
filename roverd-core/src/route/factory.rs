//! Variant selection for route managers.

use super::{
    IdleRouteManager, IvRouteManager, LevelingRouteManager, RouteManager, RouteManagerConfig,
    StandardRouteManager,
};
use crate::routecalc::RouteCalculator;
use roverd_model::{Area, AreaMode, Location};
use std::sync::Arc;

/// Build the manager variant for an area. `seed` holds the coordinates
/// the route is calculated from (already fence-filtered); `centroid`
/// is the fence centroid used by the leveling search.
pub fn build_route_manager(
    area: &Area,
    calculator: RouteCalculator,
    seed: Vec<Location>,
    centroid: Location,
) -> Arc<dyn RouteManager> {
    let config = RouteManagerConfig::from_area(area);
    match area.mode {
        AreaMode::Idle => Arc::new(IdleRouteManager::new(config)),
        AreaMode::IvMitm => Arc::new(IvRouteManager::new(config)),
        AreaMode::Pokestops if area.level => {
            Arc::new(LevelingRouteManager::new(config, seed, centroid))
        }
        _ => Arc::new(StandardRouteManager::new(config, calculator, seed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use roverd_model::{AreaId, GeofenceId};

    fn calc() -> RouteCalculator {
        RouteCalculator::new(Arc::new(MemoryStore::default()))
    }

    #[test]
    fn mode_selects_variant() {
        let centroid = Location::new(0.0, 0.0);

        let idle = Area::for_mode(AreaId(1), "a", AreaMode::Idle, GeofenceId(1));
        assert_eq!(
            build_route_manager(&idle, calc(), vec![], centroid).mode(),
            AreaMode::Idle
        );

        let iv = Area::for_mode(AreaId(2), "b", AreaMode::IvMitm, GeofenceId(1));
        assert_eq!(
            build_route_manager(&iv, calc(), vec![], centroid).mode(),
            AreaMode::IvMitm
        );

        let mut stops = Area::for_mode(AreaId(3), "c", AreaMode::Pokestops, GeofenceId(1));
        stops.level = true;
        let rm = build_route_manager(&stops, calc(), vec![], centroid);
        assert_eq!(rm.mode(), AreaMode::Pokestops);
        assert_eq!(rm.remaining_coords(), 0);

        let mon = Area::for_mode(AreaId(4), "d", AreaMode::MonMitm, GeofenceId(1));
        assert_eq!(
            build_route_manager(&mon, calc(), vec![], centroid).mode(),
            AreaMode::MonMitm
        );
    }
}
