use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use travel_route_planner::models::FlightOffer;
use travel_route_planner::{
    Coordinates, FlightOfferSearch, InMemoryLocationLookup, ItineraryRequest, Objective,
    PlannerConfig, RoutePlanner, TravelMode, UpstreamError, Waypoint,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Plan routes between airports, hotels and coordinates")]
struct Args {
    /// JSON file with `airports` and `hotels` reference records
    #[arg(long)]
    reference: PathBuf,

    /// Optional planner configuration (JSON); TRAVEL_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Straight-line estimate between two waypoints
    Direct {
        #[arg(long, value_parser = parse_waypoint)]
        from: Waypoint,
        #[arg(long, value_parser = parse_waypoint)]
        to: Waypoint,
        #[arg(long, default_value = "driving")]
        mode: String,
    },
    /// Nearest-neighbour visiting order
    Optimize {
        #[arg(long, value_parser = parse_waypoint)]
        start: Waypoint,
        #[arg(long = "stop", value_parser = parse_waypoint, required = true)]
        stops: Vec<Waypoint>,
        #[arg(long, default_value = "driving")]
        mode: String,
        #[arg(long, default_value = "distance")]
        objective: String,
    },
    /// Travel time matrix, origins as rows
    Matrix {
        #[arg(long = "origin", value_parser = parse_waypoint, required = true)]
        origins: Vec<Waypoint>,
        #[arg(long = "destination", value_parser = parse_waypoint, required = true)]
        destinations: Vec<Waypoint>,
        #[arg(long, default_value = "driving")]
        mode: String,
    },
    /// Candidates within a radius of a center point
    Nearby {
        #[arg(long, value_parser = parse_waypoint)]
        center: Waypoint,
        #[arg(long = "candidate", value_parser = parse_waypoint, required = true)]
        candidates: Vec<Waypoint>,
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Itinerary with ground estimates; flight legs are unavailable offline
    Itinerary {
        #[arg(long, value_parser = parse_waypoint)]
        from: Waypoint,
        #[arg(long, value_parser = parse_waypoint)]
        to: Waypoint,
        #[arg(long = "via", value_parser = parse_waypoint)]
        waypoints: Vec<Waypoint>,
        #[arg(long)]
        departure: NaiveDate,
        #[arg(long = "return")]
        return_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 1)]
        passengers: u32,
        #[arg(long, default_value = "flying")]
        mode: String,
    },
}

// `airport:CDG`, `hotel:H-123` or `lat,lon`
fn parse_waypoint(value: &str) -> Result<Waypoint, String> {
    if let Some(code) = value.strip_prefix("airport:") {
        return Ok(Waypoint::airport(code));
    }
    if let Some(id) = value.strip_prefix("hotel:") {
        return Ok(Waypoint::hotel(id));
    }
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected airport:CODE, hotel:ID or lat,lon, got '{value}'"))?;
    let latitude: f64 = lat.trim().parse().map_err(|_| format!("bad latitude '{lat}'"))?;
    let longitude: f64 = lon.trim().parse().map_err(|_| format!("bad longitude '{lon}'"))?;
    let coordinates = Coordinates::new(latitude, longitude).map_err(|e| e.to_string())?;
    Ok(Waypoint::custom(coordinates))
}

// No flight supplier is configured for the command line tool.
struct OfflineFlightSearch;

#[async_trait]
impl FlightOfferSearch for OfflineFlightSearch {
    async fn search(
        &self,
        _origin: &str,
        _destination: &str,
        _date: NaiveDate,
        _passengers: u32,
    ) -> Result<Vec<FlightOffer>, UpstreamError> {
        Err(UpstreamError::service_unavailable("no flight supplier configured"))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = PlannerConfig::load(args.config.as_deref())?;

    let reference = std::fs::read_to_string(&args.reference)
        .with_context(|| format!("Failed to read reference data {}", args.reference.display()))?;
    let lookup = InMemoryLocationLookup::from_json(&reference)
        .with_context(|| format!("Failed to parse reference data {}", args.reference.display()))?;
    tracing::info!("reference data loaded from {:?}", args.reference);

    let planner = RoutePlanner::new(config, Arc::new(lookup), Arc::new(OfflineFlightSearch))?;

    match args.command {
        Command::Direct { from, to, mode } => {
            let leg = planner
                .calculate_direct_route(&from, &to, TravelMode::from(mode.as_str()))
                .await?;
            print_json(&leg)?;
        }
        Command::Optimize {
            start,
            stops,
            mode,
            objective,
        } => {
            let itinerary = planner
                .optimize_multi_destination_route(
                    &start,
                    &stops,
                    TravelMode::from(mode.as_str()),
                    Objective::from(objective.as_str()),
                )
                .await?;
            print_json(&itinerary)?;
        }
        Command::Matrix {
            origins,
            destinations,
            mode,
        } => {
            let matrix = planner
                .get_travel_time_matrix(&origins, &destinations, TravelMode::from(mode.as_str()))
                .await?;
            print_json(&matrix)?;
        }
        Command::Nearby {
            center,
            candidates,
            radius_km,
        } => {
            let nearby = planner.find_nearby(&center, &candidates, radius_km).await?;
            print_json(&nearby)?;
        }
        Command::Itinerary {
            from,
            to,
            waypoints,
            departure,
            return_date,
            passengers,
            mode,
        } => {
            let mut request = ItineraryRequest::new(from, to, departure);
            request.waypoints = waypoints;
            request.return_date = return_date;
            request.passengers = passengers;
            request.mode = TravelMode::from(mode.as_str());
            let outcome = planner.build_flight_itinerary(&request).await?;
            print_json(&outcome)?;
        }
    }

    tracing::debug!(stats = ?planner.cache_stats(), "cache state at exit");
    Ok(())
}
