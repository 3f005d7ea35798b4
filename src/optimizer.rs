// Multi-destination visiting order using the nearest-neighbour heuristic.
//
// Not an exact TSP solver: the greedy tour can be longer than the optimum and
// callers depend on the greedy order.

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::geo::{distance_km, duration_minutes, round_km, Coordinates, TravelMode};
use crate::location::LocationResolver;
use crate::models::{
    Itinerary, ItineraryMetadata, LegType, Objective, ResolvedPoint, RouteLeg, Waypoint,
};

pub const NEAREST_NEIGHBOR_ALGORITHM: &str = "nearest-neighbor";

pub struct RouteOptimizer {
    resolver: LocationResolver,
}

impl RouteOptimizer {
    pub fn new(resolver: LocationResolver) -> Self {
        Self { resolver }
    }

    // Resolves every point, then orders the stops greedily from `start`.
    // Any stop that fails to resolve aborts the whole optimization.
    pub async fn optimize(
        &self,
        start: &Waypoint,
        stops: &[Waypoint],
        mode: TravelMode,
        objective: Objective,
    ) -> Result<Itinerary> {
        let start = self.resolver.resolve(start).await?;
        let stops = self.resolver.resolve_all(stops).await?;
        optimize_resolved(start, stops, mode, objective)
    }
}

pub fn optimize_resolved(
    start: ResolvedPoint,
    stops: Vec<ResolvedPoint>,
    mode: TravelMode,
    objective: Objective,
) -> Result<Itinerary> {
    let stop_coordinates: Vec<Coordinates> = stops.iter().map(|s| s.coordinates).collect();
    let order = nearest_neighbor_order(&start.coordinates, &stop_coordinates, mode, objective)?;

    let mut route = Vec::with_capacity(stops.len() + 1);
    route.push(start);
    let mut stops: Vec<Option<ResolvedPoint>> = stops.into_iter().map(Some).collect();
    for index in order {
        if let Some(stop) = stops[index].take() {
            route.push(stop);
        }
    }

    let legs = route
        .windows(2)
        .map(|pair| estimated_leg(&pair[0], &pair[1], mode))
        .collect::<Result<Vec<_>>>()?;

    debug!(legs = legs.len(), %mode, ?objective, "optimized route");
    Ok(summarize_estimates(legs, mode, Some(objective)))
}

// Visiting order (indexes into `stops`) produced by repeatedly stepping to the
// closest remaining stop. Ties go to the stop listed first.
pub fn nearest_neighbor_order(
    start: &Coordinates,
    stops: &[Coordinates],
    mode: TravelMode,
    objective: Objective,
) -> Result<Vec<usize>> {
    let mut remaining: Vec<usize> = (0..stops.len()).collect();
    let mut order = Vec::with_capacity(stops.len());
    let mut current = *start;

    while !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_cost = f64::INFINITY;
        for (position, &candidate) in remaining.iter().enumerate() {
            let cost = step_cost(&current, &stops[candidate], mode, objective)?;
            if cost < best_cost {
                best_cost = cost;
                best_position = position;
            }
        }
        let next = remaining.remove(best_position);
        order.push(next);
        current = stops[next];
    }

    Ok(order)
}

fn step_cost(
    from: &Coordinates,
    to: &Coordinates,
    mode: TravelMode,
    objective: Objective,
) -> Result<f64> {
    let km = distance_km(from, to)?;
    Ok(match objective {
        Objective::Distance => km,
        Objective::Time => duration_minutes(km, mode) as f64,
    })
}

// Straight-line leg between two resolved points, flagged as an estimate.
pub fn estimated_leg(from: &ResolvedPoint, to: &ResolvedPoint, mode: TravelMode) -> Result<RouteLeg> {
    let km = distance_km(&from.coordinates, &to.coordinates)?;
    Ok(RouteLeg {
        from: from.clone(),
        to: to.clone(),
        distance_km: round_km(km),
        duration_minutes: duration_minutes(km, mode),
        mode,
        leg_type: match mode {
            TravelMode::Flying => LegType::Flight,
            _ => LegType::Ground,
        },
        is_estimate: true,
        cost: None,
        flight: None,
        unavailable_reason: None,
    })
}

fn summarize_estimates(legs: Vec<RouteLeg>, mode: TravelMode, objective: Option<Objective>) -> Itinerary {
    let total_distance_km = round_km(legs.iter().map(|leg| leg.distance_km).sum());
    let total_duration_minutes = legs.iter().map(|leg| leg.duration_minutes).sum();
    Itinerary {
        legs,
        total_distance_km,
        total_duration_minutes,
        total_cost: None,
        currency: None,
        mode,
        metadata: ItineraryMetadata {
            calculated_at: Utc::now(),
            algorithm: NEAREST_NEIGHBOR_ALGORITHM.to_string(),
            objective,
        },
    }
}
