// Multi-leg itinerary construction
//
// Airport-to-airport legs are priced through the flight offer search; every other
// leg is a straight-line ground estimate. A failed or empty flight search degrades
// only its own leg to `unavailable`, the rest of the itinerary is still built.

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, RouteError};
use crate::flights::{cheapest_offer, parse_iso8601_duration, FlightOfferSearch};
use crate::geo::{distance_km, duration_minutes, round_km, TravelMode};
use crate::location::LocationResolver;
use crate::models::{
    FlightOffer, FlightOfferSummary, Itinerary, ItineraryMetadata, LegType, ResolvedPoint,
    RouteLeg, Waypoint,
};
use crate::optimizer::estimated_leg;

pub const ITINERARY_ALGORITHM: &str = "sequential-legs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItineraryConfig {
    // Flat cost added for every ground leg, in `default_currency`.
    pub ground_leg_cost: f64,
    pub default_currency: String,
    pub max_passengers: u32,
}

impl Default for ItineraryConfig {
    fn default() -> Self {
        Self {
            ground_leg_cost: 50.0,
            default_currency: "EUR".to_string(),
            max_passengers: 9,
        }
    }
}

fn default_mode() -> TravelMode {
    TravelMode::Flying
}

fn default_passengers() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryRequest {
    pub origin: Waypoint,
    pub destination: Waypoint,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
    #[serde(default = "default_mode")]
    pub mode: TravelMode,
}

impl ItineraryRequest {
    pub fn new(origin: Waypoint, destination: Waypoint, departure_date: NaiveDate) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
            departure_date,
            return_date: None,
            passengers: default_passengers(),
            mode: default_mode(),
        }
    }

    // Compact one-line form used as a log field
    pub fn describe(&self) -> String {
        let mut parts = vec![self.origin.key()];
        parts.extend(self.waypoints.iter().map(Waypoint::key));
        parts.push(self.destination.key());
        format!(
            "{}|{}|{}|{}|{}",
            parts.join(">"),
            self.departure_date,
            self.return_date.map(|d| d.to_string()).unwrap_or_default(),
            self.passengers,
            self.mode
        )
    }
}

pub struct ItineraryBuilder {
    resolver: LocationResolver,
    flights: Arc<dyn FlightOfferSearch>,
    config: ItineraryConfig,
}

impl ItineraryBuilder {
    pub fn new(
        resolver: LocationResolver,
        flights: Arc<dyn FlightOfferSearch>,
        config: ItineraryConfig,
    ) -> Self {
        Self {
            resolver,
            flights,
            config,
        }
    }

    fn validate(&self, request: &ItineraryRequest) -> Result<()> {
        if request.passengers == 0 || request.passengers > self.config.max_passengers {
            return Err(RouteError::invalid_input(format!(
                "passengers must be between 1 and {}, got {}",
                self.config.max_passengers, request.passengers
            )));
        }
        if let Some(return_date) = request.return_date {
            if return_date < request.departure_date {
                return Err(RouteError::invalid_input(format!(
                    "return date {} is before departure date {}",
                    return_date, request.departure_date
                )));
            }
        }
        Ok(())
    }

    // Builds legs in order; each leg departs on the departure date advanced by the
    // whole days already spent travelling on the previous legs.
    pub async fn build(&self, request: &ItineraryRequest) -> Result<Itinerary> {
        self.validate(request)?;

        let mut waypoints = Vec::with_capacity(request.waypoints.len() + 2);
        waypoints.push(request.origin.clone());
        waypoints.extend(request.waypoints.iter().cloned());
        waypoints.push(request.destination.clone());
        let points = self.resolver.resolve_all(&waypoints).await?;

        let mut legs = Vec::with_capacity(points.len());
        let mut elapsed_minutes: u64 = 0;
        for pair in points.windows(2) {
            let date = request
                .departure_date
                .checked_add_days(Days::new(elapsed_minutes / (24 * 60)))
                .ok_or_else(|| {
                    RouteError::invalid_input(format!(
                        "leg date overflows after departure {}",
                        request.departure_date
                    ))
                })?;
            let leg = self.build_leg(&pair[0], &pair[1], date, request).await?;
            elapsed_minutes += u64::from(leg.duration_minutes);
            legs.push(leg);
        }

        if let Some(return_date) = request.return_date {
            if let (Some(first), Some(last)) = (points.first(), points.last()) {
                let leg = self.build_leg(last, first, return_date, request).await?;
                legs.push(leg);
            }
        }

        let itinerary = self.summarize(legs, request.mode);
        info!(
            legs = itinerary.legs.len(),
            unavailable = itinerary.unavailable_legs().len(),
            total_cost = ?itinerary.total_cost,
            "built itinerary"
        );
        Ok(itinerary)
    }

    async fn build_leg(
        &self,
        from: &ResolvedPoint,
        to: &ResolvedPoint,
        date: NaiveDate,
        request: &ItineraryRequest,
    ) -> Result<RouteLeg> {
        let flight_allowed = request.mode == TravelMode::Flying;
        if flight_allowed && from.is_airport() && to.is_airport() {
            self.flight_leg(from, to, date, request.passengers).await
        } else {
            self.ground_leg(from, to, request.mode)
        }
    }

    async fn flight_leg(
        &self,
        from: &ResolvedPoint,
        to: &ResolvedPoint,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<RouteLeg> {
        let origin = from.label();
        let destination = to.label();

        let offers = match self.flights.search(&origin, &destination, date, passengers).await {
            Ok(offers) => offers,
            Err(e) => {
                warn!(%origin, %destination, %date, error = %e, "flight search failed, leg unavailable");
                return unavailable_leg(from, to, format!("flight search failed: {e}"));
            }
        };

        match cheapest_offer(&offers) {
            Some(offer) => {
                debug!(%origin, %destination, offer = %offer.id, price = offer.price.amount, "selected cheapest offer");
                flight_leg_from_offer(from, to, offer)
            }
            None => {
                debug!(%origin, %destination, %date, "no flight offers");
                unavailable_leg(from, to, format!("no flight offers for {date}"))
            }
        }
    }

    fn ground_leg(&self, from: &ResolvedPoint, to: &ResolvedPoint, mode: TravelMode) -> Result<RouteLeg> {
        let ground_mode = match mode {
            TravelMode::Flying => TravelMode::Driving,
            other => other,
        };
        let mut leg = estimated_leg(from, to, ground_mode)?;
        leg.cost = Some(self.config.ground_leg_cost);
        Ok(leg)
    }

    fn summarize(&self, legs: Vec<RouteLeg>, mode: TravelMode) -> Itinerary {
        let available = || legs.iter().filter(|leg| leg.is_available());

        let total_distance_km = round_km(available().map(|leg| leg.distance_km).sum());
        let total_duration_minutes = available().map(|leg| leg.duration_minutes).sum();
        let total_cost: f64 = available().filter_map(|leg| leg.cost).sum();

        let currencies: Vec<&str> = legs
            .iter()
            .filter_map(|leg| leg.flight.as_ref())
            .map(|flight| flight.price.currency.as_str())
            .collect();
        if currencies.windows(2).any(|pair| pair[0] != pair[1]) {
            warn!(?currencies, "flight offers priced in different currencies");
        }
        let currency = currencies
            .first()
            .map(|c| c.to_string())
            .unwrap_or_else(|| self.config.default_currency.clone());

        Itinerary {
            total_distance_km,
            total_duration_minutes,
            total_cost: Some((total_cost * 100.0).round() / 100.0),
            currency: Some(currency),
            mode,
            metadata: ItineraryMetadata {
                calculated_at: Utc::now(),
                algorithm: ITINERARY_ALGORITHM.to_string(),
                objective: None,
            },
            legs,
        }
    }
}

fn flight_leg_from_offer(from: &ResolvedPoint, to: &ResolvedPoint, offer: &FlightOffer) -> Result<RouteLeg> {
    let km = distance_km(&from.coordinates, &to.coordinates)?;
    let minutes = parse_iso8601_duration(&offer.duration).unwrap_or_else(|| {
        warn!(offer = %offer.id, duration = %offer.duration, "unparseable flight duration, estimating");
        duration_minutes(km, TravelMode::Flying)
    });

    Ok(RouteLeg {
        from: from.clone(),
        to: to.clone(),
        distance_km: round_km(km),
        duration_minutes: minutes,
        mode: TravelMode::Flying,
        leg_type: LegType::Flight,
        is_estimate: false,
        cost: Some(offer.price.amount),
        flight: Some(FlightOfferSummary {
            offer_id: offer.id.clone(),
            carrier: offer.segments.first().map(|s| s.carrier.clone()),
            price: offer.price.clone(),
            duration_iso: offer.duration.clone(),
            duration_minutes: minutes,
            segments: offer.segments.clone(),
        }),
        unavailable_reason: None,
    })
}

fn unavailable_leg(from: &ResolvedPoint, to: &ResolvedPoint, reason: String) -> Result<RouteLeg> {
    let km = distance_km(&from.coordinates, &to.coordinates)?;
    Ok(RouteLeg {
        from: from.clone(),
        to: to.clone(),
        distance_km: round_km(km),
        duration_minutes: 0,
        mode: TravelMode::Flying,
        leg_type: LegType::Unavailable,
        is_estimate: false,
        cost: None,
        flight: None,
        unavailable_reason: Some(reason),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flights::mock_search::{offer, MockFlightSearch};
    use crate::location::fixtures::european_airports;
    use crate::upstream::UpstreamError;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn builder(flights: Arc<MockFlightSearch>) -> ItineraryBuilder {
        ItineraryBuilder::new(
            LocationResolver::new(Arc::new(european_airports())),
            flights,
            ItineraryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_round_trip_picks_cheapest_offers() {
        let flights = Arc::new(MockFlightSearch::new());
        flights.add_offers(
            "CDG",
            "FCO",
            vec![
                offer("1", "CDG", "FCO", 180.0, "PT2H10M"),
                offer("2", "CDG", "FCO", 95.5, "PT2H5M"),
            ],
        );
        flights.add_offers("FCO", "CDG", vec![offer("3", "FCO", "CDG", 120.0, "PT2H15M")]);

        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("FCO"), date(1));
        request.return_date = Some(date(8));
        request.passengers = 2;

        let itinerary = builder(Arc::clone(&flights)).build(&request).await.unwrap();

        assert_eq!(itinerary.legs.len(), 2);
        let outbound = itinerary.legs[0].flight.as_ref().unwrap();
        assert_eq!(outbound.offer_id, "2");
        assert_eq!(outbound.carrier.as_deref(), Some("AF"));
        assert_eq!(itinerary.total_cost, Some(215.5));
        assert_eq!(itinerary.total_duration_minutes, 125 + 135);
        assert_eq!(itinerary.currency.as_deref(), Some("EUR"));

        let calls = flights.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].date, calls[0].passengers), (date(1), 2));
        assert_eq!((calls[1].origin.as_str(), calls[1].date), ("FCO", date(8)));
    }

    #[tokio::test]
    async fn test_empty_offers_marks_leg_unavailable_and_still_builds_return() {
        let flights = Arc::new(MockFlightSearch::new());
        flights.add_offers("LHR", "CDG", vec![offer("9", "LHR", "CDG", 70.0, "PT1H15M")]);

        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("LHR"), date(3));
        request.return_date = Some(date(5));

        let itinerary = builder(Arc::clone(&flights)).build(&request).await.unwrap();

        assert_eq!(itinerary.legs[0].leg_type, LegType::Unavailable);
        assert!(itinerary.legs[0].unavailable_reason.is_some());
        assert_eq!(itinerary.legs[1].leg_type, LegType::Flight);
        assert_eq!(itinerary.unavailable_legs(), vec![0]);
        assert_eq!(itinerary.total_cost, Some(70.0));
        assert_eq!(flights.request_count(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_degrades_only_that_leg() {
        let flights = Arc::new(MockFlightSearch::new());
        flights.fail_route("CDG", "LHR", UpstreamError::RateLimitExceeded("429".to_string()));
        flights.add_offers("LHR", "MAD", vec![offer("4", "LHR", "MAD", 60.0, "PT2H20M")]);

        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("MAD"), date(1));
        request.waypoints = vec![Waypoint::airport("LHR")];

        let itinerary = builder(flights).build(&request).await.unwrap();

        assert_eq!(itinerary.legs.len(), 2);
        assert_eq!(itinerary.legs[0].leg_type, LegType::Unavailable);
        assert!(itinerary.legs[0]
            .unavailable_reason
            .as_deref()
            .unwrap()
            .contains("Rate limit"));
        assert_eq!(itinerary.legs[1].leg_type, LegType::Flight);
    }

    #[tokio::test]
    async fn test_total_outage_returns_all_legs_unavailable() {
        let flights = Arc::new(MockFlightSearch::new());
        flights.set_outage(true);

        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("FCO"), date(1));
        request.waypoints = vec![Waypoint::airport("MAD")];
        request.return_date = Some(date(9));

        let itinerary = builder(flights).build(&request).await.unwrap();

        assert_eq!(itinerary.legs.len(), 3);
        assert_eq!(itinerary.unavailable_legs(), vec![0, 1, 2]);
        assert_eq!(itinerary.total_cost, Some(0.0));
        assert_eq!(itinerary.total_duration_minutes, 0);
        assert_eq!(itinerary.total_distance_km, 0.0);
    }

    #[tokio::test]
    async fn test_hotel_legs_use_ground_estimates() {
        let flights = Arc::new(MockFlightSearch::new());
        let request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::hotel("H-LOUVRE"), date(1));

        let itinerary = builder(Arc::clone(&flights)).build(&request).await.unwrap();

        let leg = &itinerary.legs[0];
        assert_eq!(leg.leg_type, LegType::Ground);
        assert_eq!(leg.mode, TravelMode::Driving);
        assert!(leg.is_estimate);
        assert_eq!(leg.cost, Some(50.0));
        assert_eq!(flights.request_count(), 0);
    }

    #[tokio::test]
    async fn test_non_flying_mode_never_searches_flights() {
        let flights = Arc::new(MockFlightSearch::new());
        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("LHR"), date(1));
        request.mode = TravelMode::Transit;

        let itinerary = builder(Arc::clone(&flights)).build(&request).await.unwrap();

        assert_eq!(itinerary.legs[0].mode, TravelMode::Transit);
        assert_eq!(flights.request_count(), 0);
    }

    #[tokio::test]
    async fn test_later_legs_depart_after_accumulated_days() {
        let flights = Arc::new(MockFlightSearch::new());
        // a 26 hour first leg pushes the next search to the following day
        flights.add_offers("CDG", "LHR", vec![offer("5", "CDG", "LHR", 300.0, "P1DT2H")]);
        flights.add_offers("LHR", "MAD", vec![offer("6", "LHR", "MAD", 80.0, "PT2H20M")]);

        let mut request = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("MAD"), date(10));
        request.waypoints = vec![Waypoint::airport("LHR")];

        builder(Arc::clone(&flights)).build(&request).await.unwrap();

        let dates: Vec<NaiveDate> = flights.calls().iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![date(10), date(11)]);
    }

    #[tokio::test]
    async fn test_leg_date_overflow_is_invalid_input() {
        let flights = Arc::new(MockFlightSearch::new());
        flights.add_offers("CDG", "LHR", vec![offer("5", "CDG", "LHR", 300.0, "P1DT2H")]);

        let mut request =
            ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("MAD"), NaiveDate::MAX);
        request.waypoints = vec![Waypoint::airport("LHR")];

        let err = builder(Arc::clone(&flights)).build(&request).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(flights.request_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let flights = Arc::new(MockFlightSearch::new());
        let builder = builder(flights);

        let mut no_passengers = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("LHR"), date(2));
        no_passengers.passengers = 0;
        assert!(builder.build(&no_passengers).await.unwrap_err().is_invalid_input());

        let mut backwards = ItineraryRequest::new(Waypoint::airport("CDG"), Waypoint::airport("LHR"), date(5));
        backwards.return_date = Some(date(2));
        assert!(builder.build(&backwards).await.unwrap_err().is_invalid_input());
    }

    #[tokio::test]
    async fn test_unresolvable_origin_is_fatal() {
        let flights = Arc::new(MockFlightSearch::new());
        let request = ItineraryRequest::new(Waypoint::airport("QQQ"), Waypoint::airport("LHR"), date(2));
        let err = builder(flights).build(&request).await.unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_request_deserialization_defaults() {
        let json = r#"{
            "origin": {"kind": "airport", "identifier": "CDG"},
            "destination": {"kind": "airport", "identifier": "FCO"},
            "departure_date": "2025-06-01"
        }"#;
        let request: ItineraryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.passengers, 1);
        assert_eq!(request.mode, TravelMode::Flying);
        assert!(request.waypoints.is_empty());
    }
}
