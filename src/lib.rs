// Main library file for the travel route planner

// Core building blocks
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod upstream;

// Collaborators and the services built on top of them
pub mod flights;
pub mod itinerary;
pub mod location;
pub mod optimizer;
pub mod planner;

// Re-export key types for convenience
pub use cache::{CacheConfig, CacheStatsReport, CacheTtlPolicy, ResponseCache};
pub use config::{ConfigError, PlannerConfig};
pub use error::{Result, RouteError};
pub use flights::{CachedFlightSearch, FlightOfferSearch};
pub use geo::{Coordinates, TravelMode};
pub use itinerary::{ItineraryBuilder, ItineraryConfig, ItineraryRequest};
pub use location::{
    CachedLocationLookup, InMemoryLocationLookup, LocationLookup, LocationResolver, ReferenceData,
};
pub use models::{
    Itinerary, LegType, MatrixCell, Objective, ResolvedPoint, RouteLeg, RouteOutcome, Waypoint,
    WaypointKind,
};
pub use optimizer::RouteOptimizer;
pub use planner::{NearbyPoint, RoutePlanner};
pub use upstream::UpstreamError;
