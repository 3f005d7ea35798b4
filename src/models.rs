// Data structures exchanged between the planner components and their callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RouteError};
use crate::geo::{Coordinates, TravelMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointKind {
    Airport,
    Hotel,
    Custom,
}

impl WaypointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WaypointKind::Airport => "airport",
            WaypointKind::Hotel => "hotel",
            WaypointKind::Custom => "custom",
        }
    }

    // Airport codes compare case-insensitively, other identifiers are kept as given
    pub fn normalize_identifier(self, identifier: &str) -> String {
        match self {
            WaypointKind::Airport => identifier.trim().to_uppercase(),
            _ => identifier.trim().to_string(),
        }
    }
}

impl fmt::Display for WaypointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// A logical travel point before coordinate resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub kind: WaypointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Waypoint {
    pub fn airport(code: &str) -> Self {
        Self {
            kind: WaypointKind::Airport,
            identifier: Some(code.to_uppercase()),
            coordinates: None,
        }
    }

    pub fn hotel(hotel_id: &str) -> Self {
        Self {
            kind: WaypointKind::Hotel,
            identifier: Some(hotel_id.to_string()),
            coordinates: None,
        }
    }

    pub fn custom(coordinates: Coordinates) -> Self {
        Self {
            kind: WaypointKind::Custom,
            identifier: None,
            coordinates: Some(coordinates),
        }
    }

    pub fn is_airport(&self) -> bool {
        self.kind == WaypointKind::Airport
    }

    // Cache key fragment; explicit coordinates take precedence like in resolution
    pub fn key(&self) -> String {
        match (&self.coordinates, &self.identifier) {
            (Some(c), _) => format!("{}@{}", self.kind, c.key()),
            (None, Some(id)) => format!("{}:{}", self.kind, self.kind.normalize_identifier(id)),
            (None, None) => format!("{}:?", self.kind),
        }
    }
}

// A waypoint after resolution, always carrying coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPoint {
    pub kind: WaypointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub coordinates: Coordinates,
}

impl ResolvedPoint {
    pub fn is_airport(&self) -> bool {
        self.kind == WaypointKind::Airport && self.identifier.is_some()
    }

    pub fn label(&self) -> String {
        match &self.identifier {
            Some(id) => id.clone(),
            None => self.coordinates.key(),
        }
    }
}

// Reference record returned by a location lookup
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationRecord {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    pub departure_airport: String,
    pub departure_time: String,
    pub arrival_airport: String,
    pub arrival_time: String,
    pub carrier: String,
    pub flight_number: String,
}

// One offer as returned by the flight offer search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub id: String,
    pub price: Price,
    pub duration: String,
    pub segments: Vec<FlightSegment>,
}

// Flight details recorded on a flight leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOfferSummary {
    pub offer_id: String,
    pub carrier: Option<String>,
    pub price: Price,
    pub duration_iso: String,
    pub duration_minutes: u32,
    pub segments: Vec<FlightSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegType {
    Flight,
    Ground,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: ResolvedPoint,
    pub to: ResolvedPoint,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub mode: TravelMode,
    #[serde(rename = "type")]
    pub leg_type: LegType,
    pub is_estimate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight: Option<FlightOfferSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

impl RouteLeg {
    pub fn is_available(&self) -> bool {
        self.leg_type != LegType::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Time,
    #[default]
    Distance,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::Time => "time",
            Objective::Distance => "distance",
        }
    }
}

impl From<&str> for Objective {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "time" | "duration" => Objective::Time,
            _ => Objective::Distance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryMetadata {
    pub calculated_at: DateTime<Utc>,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub legs: Vec<RouteLeg>,
    pub total_distance_km: f64,
    pub total_duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub mode: TravelMode,
    pub metadata: ItineraryMetadata,
}

impl Itinerary {
    // Indexes of legs flagged unavailable.
    pub fn unavailable_legs(&self) -> Vec<usize> {
        self.legs
            .iter()
            .enumerate()
            .filter(|(_, leg)| !leg.is_available())
            .map(|(i, _)| i)
            .collect()
    }

    // Visiting order as labels, starting with the first leg's origin.
    pub fn stop_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.legs.len() + 1);
        if let Some(first) = self.legs.first() {
            labels.push(first.from.label());
        }
        labels.extend(self.legs.iter().map(|leg| leg.to.label()));
        labels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub distance_km: f64,
    pub duration_minutes: u32,
}

// Result envelope: callers branch on the tag instead of probing the payload shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteOutcome<T> {
    Complete { data: T },
    PartialFailure { data: T, failed_legs: Vec<usize> },
}

impl<T> RouteOutcome<T> {
    pub fn data(&self) -> &T {
        match self {
            RouteOutcome::Complete { data } => data,
            RouteOutcome::PartialFailure { data, .. } => data,
        }
    }

    pub fn failed_legs(&self) -> &[usize] {
        match self {
            RouteOutcome::Complete { .. } => &[],
            RouteOutcome::PartialFailure { failed_legs, .. } => failed_legs,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RouteOutcome::Complete { .. })
    }
}

impl From<Itinerary> for RouteOutcome<Itinerary> {
    fn from(itinerary: Itinerary) -> Self {
        let failed_legs = itinerary.unavailable_legs();
        if failed_legs.is_empty() {
            RouteOutcome::Complete { data: itinerary }
        } else {
            RouteOutcome::PartialFailure {
                data: itinerary,
                failed_legs,
            }
        }
    }
}

pub(crate) fn require_identifier(waypoint: &Waypoint) -> Result<&str> {
    waypoint
        .identifier
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            RouteError::resolution(format!("{} waypoint has no identifier", waypoint.kind))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waypoint_deserialization() {
        let json = r#"[
            {"kind": "airport", "identifier": "JFK"},
            {"kind": "custom", "coordinates": {"latitude": 48.85, "longitude": 2.35}}
        ]"#;
        let waypoints: Vec<Waypoint> = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(waypoints[0], Waypoint::airport("jfk"));
        assert_eq!(waypoints[1].kind, WaypointKind::Custom);
        assert!(waypoints[1].identifier.is_none());
    }

    #[test]
    fn test_waypoint_keys() {
        assert_eq!(Waypoint::airport("cdg").key(), "airport:CDG");
        let lowercase: Waypoint =
            serde_json::from_str(r#"{"kind": "airport", "identifier": " cdg"}"#).unwrap();
        assert_eq!(lowercase.key(), "airport:CDG");
        let custom = Waypoint::custom(Coordinates::new(1.5, -2.25).unwrap());
        assert_eq!(custom.key(), "custom@1.50000,-2.25000");
    }

    #[test]
    fn test_outcome_tagging() {
        let leg = |leg_type| RouteLeg {
            from: ResolvedPoint {
                kind: WaypointKind::Custom,
                identifier: None,
                coordinates: Coordinates::new(0.0, 0.0).unwrap(),
            },
            to: ResolvedPoint {
                kind: WaypointKind::Custom,
                identifier: None,
                coordinates: Coordinates::new(0.0, 1.0).unwrap(),
            },
            distance_km: 111.2,
            duration_minutes: 111,
            mode: TravelMode::Driving,
            leg_type,
            is_estimate: true,
            cost: None,
            flight: None,
            unavailable_reason: None,
        };
        let itinerary = Itinerary {
            legs: vec![leg(LegType::Ground), leg(LegType::Unavailable)],
            total_distance_km: 111.2,
            total_duration_minutes: 111,
            total_cost: None,
            currency: None,
            mode: TravelMode::Driving,
            metadata: ItineraryMetadata {
                calculated_at: Utc::now(),
                algorithm: "test".to_string(),
                objective: None,
            },
        };

        let outcome = RouteOutcome::from(itinerary);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed_legs(), &[1]);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "partial_failure");
        assert_eq!(json["data"]["legs"][1]["type"], "unavailable");
    }
}
