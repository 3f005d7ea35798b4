// Service root
//
// `RoutePlanner` is constructed once at startup. It owns the response cache, wires
// the cached collaborators into the resolver, optimizer and itinerary builder, and
// exposes the operations consumed by the HTTP controllers.

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::cache::{create_cache_key, CacheStatsReport, ResponseCache, ROUTES_NAMESPACE};
use crate::config::{ConfigError, PlannerConfig};
use crate::error::{Result, RouteError};
use crate::flights::{CachedFlightSearch, FlightOfferSearch};
use crate::geo::{distance_km, duration_minutes, find_nearby, round_km, TravelMode, DEFAULT_NEARBY_RADIUS_KM};
use crate::itinerary::{ItineraryBuilder, ItineraryRequest};
use crate::location::{CachedLocationLookup, LocationLookup, LocationResolver};
use crate::models::{Itinerary, MatrixCell, Objective, ResolvedPoint, RouteLeg, RouteOutcome, Waypoint};
use crate::optimizer::{estimated_leg, RouteOptimizer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPoint {
    pub point: ResolvedPoint,
    pub distance_km: f64,
}

pub struct RoutePlanner {
    cache: Arc<ResponseCache>,
    resolver: LocationResolver,
    optimizer: RouteOptimizer,
    itineraries: ItineraryBuilder,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RoutePlanner {
    pub fn new(
        config: PlannerConfig,
        lookup: Arc<dyn LocationLookup>,
        flights: Arc<dyn FlightOfferSearch>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let lookup: Arc<dyn LocationLookup> =
            Arc::new(CachedLocationLookup::new(lookup, Arc::clone(&cache)));
        let flights: Arc<dyn FlightOfferSearch> =
            Arc::new(CachedFlightSearch::new(flights, Arc::clone(&cache)));
        let resolver = LocationResolver::new(lookup);

        Ok(Self {
            optimizer: RouteOptimizer::new(resolver.clone()),
            itineraries: ItineraryBuilder::new(resolver.clone(), flights, config.itinerary),
            resolver,
            cache,
            sweeper: Mutex::new(None),
        })
    }

    // Starts the background expiry sweep. Must run inside a tokio runtime;
    // calling it again replaces the previous sweeper.
    pub fn start_sweeper(&self) {
        let handle = self.cache.spawn_sweeper();
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
        info!(
            interval_secs = self.cache.config().sweep_interval_seconds,
            "cache sweeper started"
        );
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    #[instrument(skip(self), fields(origin = %origin.key(), destination = %destination.key()))]
    pub async fn calculate_direct_route(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<RouteLeg> {
        let key = create_cache_key(
            ROUTES_NAMESPACE,
            &["direct", origin.key().as_str(), destination.key().as_str(), mode.as_str()],
        );
        self.cache
            .get_or_compute(&key, self.cache.ttl_policy().routes(), || async {
                let from = self.resolver.resolve(origin).await?;
                let to = self.resolver.resolve(destination).await?;
                estimated_leg(&from, &to, mode)
            })
            .await
    }

    // Nearest-neighbour tour over `stops` starting at `start`.
    #[instrument(skip(self, start, stops), fields(stops = stops.len()))]
    pub async fn optimize_multi_destination_route(
        &self,
        start: &Waypoint,
        stops: &[Waypoint],
        mode: TravelMode,
        objective: Objective,
    ) -> Result<Itinerary> {
        if stops.len() < 2 {
            return Err(RouteError::invalid_input(format!(
                "at least two destinations are required for optimization, got {}",
                stops.len()
            )));
        }

        let mut points = vec![start.key()];
        points.extend(stops.iter().map(Waypoint::key));
        let key = create_cache_key(
            ROUTES_NAMESPACE,
            &["optimize", mode.as_str(), objective.as_str(), points.join(">").as_str()],
        );
        self.cache
            .get_or_compute(&key, self.cache.ttl_policy().routes(), || {
                self.optimizer.optimize(start, stops, mode, objective)
            })
            .await
    }

    // Flight legs are cached individually under the flight TTL; the itinerary
    // itself is rebuilt on every call since prices move.
    #[instrument(skip(self, request), fields(request = %request.describe()))]
    pub async fn build_flight_itinerary(
        &self,
        request: &ItineraryRequest,
    ) -> Result<RouteOutcome<Itinerary>> {
        let itinerary = self.itineraries.build(request).await?;
        Ok(RouteOutcome::from(itinerary))
    }

    // Distance and duration from every origin (rows) to every destination (columns).
    // Each waypoint is resolved once.
    #[instrument(skip(self, origins, destinations), fields(rows = origins.len(), columns = destinations.len()))]
    pub async fn get_travel_time_matrix(
        &self,
        origins: &[Waypoint],
        destinations: &[Waypoint],
        mode: TravelMode,
    ) -> Result<Vec<Vec<MatrixCell>>> {
        if origins.is_empty() || destinations.is_empty() {
            return Err(RouteError::invalid_input(
                "travel time matrix needs at least one origin and one destination",
            ));
        }

        let origins = self.resolver.resolve_all(origins).await?;
        let destinations = self.resolver.resolve_all(destinations).await?;

        origins
            .iter()
            .map(|origin| {
                destinations
                    .iter()
                    .map(|destination| -> Result<MatrixCell> {
                        let km = distance_km(&origin.coordinates, &destination.coordinates)?;
                        Ok(MatrixCell {
                            distance_km: round_km(km),
                            duration_minutes: duration_minutes(km, mode),
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    // Candidates within `radius_km` (default 50 km) of `center`, closest first.
    pub async fn find_nearby(
        &self,
        center: &Waypoint,
        candidates: &[Waypoint],
        radius_km: Option<f64>,
    ) -> Result<Vec<NearbyPoint>> {
        let center = self.resolver.resolve(center).await?;
        let candidates = self.resolver.resolve_all(candidates).await?;
        let radius_km = radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);

        let nearby = find_nearby(
            &center.coordinates,
            candidates.as_slice(),
            radius_km,
            |p: &ResolvedPoint| p.coordinates,
        )?;
        Ok(nearby
            .into_iter()
            .map(|(point, distance_km)| NearbyPoint { point, distance_km })
            .collect())
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    // Removes every cache key matching the regular expression `pattern`.
    pub fn invalidate(&self, pattern: &str) -> Result<usize> {
        let pattern = Regex::new(pattern)
            .map_err(|e| RouteError::invalid_input(format!("invalid cache pattern: {e}")))?;
        let removed = self.cache.invalidate_pattern(&pattern);
        info!(pattern = pattern.as_str(), removed, "cache invalidated");
        Ok(removed)
    }
}

impl Drop for RoutePlanner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
