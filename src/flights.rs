// Flight offer search seam and its cached decorator

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{create_cache_key, ResponseCache, FLIGHTS_NAMESPACE};
use crate::models::{FlightOffer, WaypointKind};
use crate::upstream::UpstreamError;

// Upstream flight offer search (e.g. a GDS or airline aggregator client).
//
// Retries and rate-limit backoff are the implementor's concern.
#[async_trait]
pub trait FlightOfferSearch: Send + Sync {
    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<Vec<FlightOffer>, UpstreamError>;
}

// Wraps a search so identical queries within the flight TTL skip the network.
pub struct CachedFlightSearch<S> {
    inner: S,
    cache: Arc<ResponseCache>,
}

impl<S: FlightOfferSearch> CachedFlightSearch<S> {
    pub fn new(inner: S, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache_key(origin: &str, destination: &str, date: NaiveDate, passengers: u32) -> String {
        let origin = WaypointKind::Airport.normalize_identifier(origin);
        let destination = WaypointKind::Airport.normalize_identifier(destination);
        let date = date.format("%Y-%m-%d").to_string();
        let passengers = passengers.to_string();
        create_cache_key(
            FLIGHTS_NAMESPACE,
            &[origin.as_str(), destination.as_str(), date.as_str(), passengers.as_str()],
        )
    }
}

#[async_trait]
impl<S: FlightOfferSearch> FlightOfferSearch for CachedFlightSearch<S> {
    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<Vec<FlightOffer>, UpstreamError> {
        // the upstream sees exactly the codes the cache key is built from
        let origin = WaypointKind::Airport.normalize_identifier(origin);
        let destination = WaypointKind::Airport.normalize_identifier(destination);
        let key = Self::cache_key(&origin, &destination, date, passengers);
        let ttl = self.cache.ttl_policy().flight_offers();
        self.cache
            .get_or_compute(&key, ttl, || async {
                debug!(%origin, %destination, %date, passengers, "searching flight offers upstream");
                self.inner.search(&origin, &destination, date, passengers).await
            })
            .await
    }
}

#[async_trait]
impl<S: FlightOfferSearch + ?Sized> FlightOfferSearch for Arc<S> {
    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<Vec<FlightOffer>, UpstreamError> {
        (**self).search(origin, destination, date, passengers).await
    }
}

// Lowest-priced offer; the first one wins on equal prices.
pub fn cheapest_offer(offers: &[FlightOffer]) -> Option<&FlightOffer> {
    offers.iter().fold(None, |best: Option<&FlightOffer>, offer| match best {
        Some(current) if current.price.amount <= offer.price.amount => Some(current),
        _ => Some(offer),
    })
}

// Parses ISO-8601 durations such as `PT2H30M` or `P1DT4H` into whole minutes.
//
// Seconds are rounded to the nearest minute. Year and month designators are rejected
// because their length is calendar dependent.
pub fn parse_iso8601_duration(value: &str) -> Option<u32> {
    let rest = value.trim().strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return None;
            }
            (date, time)
        }
        None => (rest, ""),
    };

    let mut seconds: f64 = 0.0;
    for (amount, unit) in designators(date_part)? {
        seconds += match unit {
            'W' => amount * 7.0 * 86_400.0,
            'D' => amount * 86_400.0,
            _ => return None,
        };
    }
    for (amount, unit) in designators(time_part)? {
        seconds += match unit {
            'H' => amount * 3_600.0,
            'M' => amount * 60.0,
            'S' => amount,
            _ => return None,
        };
    }

    let minutes = (seconds / 60.0).round();
    if !minutes.is_finite() || minutes < 0.0 || minutes > u32::MAX as f64 {
        return None;
    }
    Some(minutes as u32)
}

// Splits "1DT" style runs into (number, designator) pairs
fn designators(part: &str) -> Option<Vec<(f64, char)>> {
    let mut pairs = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else {
            if number.is_empty() {
                return None;
            }
            let amount: f64 = number.parse().ok()?;
            pairs.push((amount, c.to_ascii_uppercase()));
            number.clear();
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(pairs)
}


#[cfg(test)]
mod tests {
    use super::mock_search::{offer, MockFlightSearch};
    use super::*;
    use crate::cache::CacheConfig;
    use test_case::test_case;

    #[test_case("PT2H30M", Some(150); "hours and minutes")]
    #[test_case("PT45M", Some(45); "minutes only")]
    #[test_case("P1DT2H", Some(1560); "day and hours")]
    #[test_case("PT1H29M40S", Some(90); "seconds round")]
    #[test_case("PT0.5H", Some(30); "fractional hours")]
    #[test_case("P1W", Some(10080); "week")]
    #[test_case("pt2h", None; "lowercase prefix rejected")]
    #[test_case("P", None; "empty")]
    #[test_case("PT", None; "empty time part")]
    #[test_case("P1M", None; "calendar month rejected")]
    #[test_case("2H30M", None; "missing prefix")]
    #[test_case("PTH", None; "missing number")]
    fn test_parse_iso8601_duration(input: &str, expected: Option<u32>) {
        assert_eq!(parse_iso8601_duration(input), expected);
    }

    #[test]
    fn test_cheapest_offer_prefers_first_on_ties() {
        let offers = vec![
            offer("1", "CDG", "JFK", 420.0, "PT8H"),
            offer("2", "CDG", "JFK", 380.0, "PT9H"),
            offer("3", "CDG", "JFK", 380.0, "PT7H"),
        ];
        assert_eq!(cheapest_offer(&offers).map(|o| o.id.as_str()), Some("2"));
        assert!(cheapest_offer(&[]).is_none());
    }

    #[tokio::test]
    async fn test_cached_search_hits_upstream_once() {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        let mock = Arc::new(MockFlightSearch::new());
        mock.add_offers("CDG", "JFK", vec![offer("1", "CDG", "JFK", 420.0, "PT8H")]);
        let search = CachedFlightSearch::new(Arc::clone(&mock), Arc::clone(&cache));
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let first = search.search("CDG", "JFK", date, 2).await.unwrap();
        let second = search.search("CDG", "JFK", date, 2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.request_count(), 1);
        assert_eq!(cache.stats().keys, vec!["flights:CDG:JFK:2025-06-01:2".to_string()]);
    }

    #[tokio::test]
    async fn test_cached_search_sends_normalized_codes_upstream() {
        let cache = Arc::new(ResponseCache::default());
        let mock = Arc::new(MockFlightSearch::new());
        mock.add_offers("CDG", "FCO", vec![offer("1", "CDG", "FCO", 99.0, "PT2H")]);
        let search = CachedFlightSearch::new(Arc::clone(&mock), Arc::clone(&cache));
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let lower = search.search("cdg", "fco", date, 1).await.unwrap();
        let upper = search.search("CDG", "FCO", date, 1).await.unwrap();

        assert_eq!(lower.len(), 1);
        assert_eq!(lower, upper);
        assert_eq!(mock.calls()[0].origin, "CDG");
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_search_does_not_cache_failures() {
        let cache = Arc::new(ResponseCache::default());
        let mock = Arc::new(MockFlightSearch::new());
        mock.set_outage(true);
        let search = CachedFlightSearch::new(Arc::clone(&mock), Arc::clone(&cache));
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        assert!(search.search("CDG", "JFK", date, 1).await.is_err());
        assert!(search.search("CDG", "JFK", date, 1).await.is_err());
        assert_eq!(mock.request_count(), 2);
        assert!(cache.is_empty());
    }
}
