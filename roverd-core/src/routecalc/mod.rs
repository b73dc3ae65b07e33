//! Route calculation: clustering plus approximate-TSP touring, run off
//! the hot path in a blocking worker.

mod cluster;
mod tour;

pub use cluster::{cluster, sorted_dedup};
pub use tour::tour;

use crate::error::{CoreError, Result};
use crate::persistence::ports::RoutecalcRepository;
use roverd_model::{Location, RecalcStatus, RouteCalcAlgorithm, RoutecalcId};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RouteCalcParams {
    pub max_radius: f64,
    pub max_coords_within_radius: usize,
    pub algorithm: RouteCalcAlgorithm,
    /// Disable clustering entirely (pokestops stand alone).
    pub skip_clustering: bool,
}

impl Default for RouteCalcParams {
    fn default() -> Self {
        RouteCalcParams {
            max_radius: 120.0,
            max_coords_within_radius: 60,
            algorithm: RouteCalcAlgorithm::Route,
            skip_clustering: false,
        }
    }
}

/// Pure calculation: cluster (unless disabled) then tour. Deterministic
/// for identical inputs; `|output| <= |input|`.
pub fn calculate(points: &[Location], params: &RouteCalcParams) -> Vec<Location> {
    match params.algorithm {
        RouteCalcAlgorithm::Routefree => {
            // Emit the input order untouched apart from invalid points.
            points.iter().copied().filter(Location::is_valid).collect()
        }
        RouteCalcAlgorithm::Route => {
            let reduced = if params.skip_clustering {
                sorted_dedup(points)
            } else {
                cluster(points, params.max_radius, params.max_coords_within_radius)
            };
            tour(&reduced)
        }
    }
}

/// Shared handle performing recalculations against the persisted
/// routecalc rows.
#[derive(Clone)]
pub struct RouteCalculator {
    repo: Arc<dyn RoutecalcRepository>,
}

impl std::fmt::Debug for RouteCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCalculator").finish_non_exhaustive()
    }
}

impl RouteCalculator {
    pub fn new(repo: Arc<dyn RoutecalcRepository>) -> Self {
        Self { repo }
    }

    /// Load the persisted route for `id`, or None when the row is
    /// missing or empty.
    pub async fn stored_route(&self, id: RoutecalcId) -> Result<Option<Vec<Location>>> {
        Ok(self
            .repo
            .get(id)
            .await?
            .map(|calc| calc.routefile)
            .filter(|route| !route.is_empty()))
    }

    /// Recalculate the route for `id` from `points`.
    ///
    /// The CPU-bound stage runs on the blocking pool. While running the
    /// row carries `recalc_status = running`; a second recalc for the
    /// same row is rejected with [`CoreError::RecalcBusy`]. With
    /// `persist = false` the result is returned without touching the
    /// routefile (in-memory mode).
    pub async fn recalculate(
        &self,
        id: RoutecalcId,
        points: Vec<Location>,
        params: RouteCalcParams,
        persist: bool,
    ) -> Result<Vec<Location>> {
        let acquired = self
            .repo
            .transition_status(id, RecalcStatus::Idle, RecalcStatus::Running)
            .await?;
        if !acquired {
            return Err(CoreError::RecalcBusy(id.as_i32()));
        }

        let result = tokio::task::spawn_blocking(move || calculate(&points, &params))
            .await
            .map_err(|e| CoreError::Internal(format!("route calculation task failed: {e}")));

        // Always release the running flag, also on calculation failure.
        let released = self
            .repo
            .transition_status(id, RecalcStatus::Running, RecalcStatus::Idle)
            .await;
        if let Err(e) = &released {
            debug!("failed releasing recalc status of {id}: {e}");
        }

        let route = result?;
        if persist {
            self.repo.save_route(id, &route).await?;
        }
        info!(
            routecalc = id.as_i32(),
            coords = route.len(),
            persisted = persist,
            "route recalculated"
        );
        Ok(route)
    }
}
