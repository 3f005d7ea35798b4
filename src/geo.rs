// Great-circle geometry and travel time estimation.
// Estimates are straight-line approximations: no road network, traffic or terrain.

use haversine::{distance, Location as HaversineLocation, Units};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RouteError};

// Radius used when a caller asks for nearby points without one.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinates = Self {
            latitude,
            longitude,
        };
        coordinates.validate()?;
        Ok(coordinates)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(RouteError::invalid_input(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(RouteError::invalid_input(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    // Stable textual form used inside cache keys
    pub fn key(&self) -> String {
        format!("{:.5},{:.5}", self.latitude, self.longitude)
    }
}

impl From<Coordinates> for HaversineLocation {
    fn from(c: Coordinates) -> Self {
        HaversineLocation {
            latitude: c.latitude,
            longitude: c.longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Transit,
    Flying,
}

impl TravelMode {
    // Average speed in km/h.
    pub fn speed_kmh(self) -> f64 {
        match self {
            TravelMode::Driving => 60.0,
            TravelMode::Walking => 5.0,
            TravelMode::Transit => 30.0,
            TravelMode::Flying => 800.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Transit => "transit",
            TravelMode::Flying => "flying",
        }
    }
}

// Unknown modes fall back to driving
impl From<&str> for TravelMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "walking" => TravelMode::Walking,
            "transit" => TravelMode::Transit,
            "flying" => TravelMode::Flying,
            _ => TravelMode::Driving,
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Haversine distance on a 6371 km sphere. Fails on out-of-range coordinates.
pub fn distance_km(a: &Coordinates, b: &Coordinates) -> Result<f64> {
    a.validate()?;
    b.validate()?;
    if a == b {
        return Ok(0.0);
    }
    let km = distance((*a).into(), (*b).into(), Units::Kilometers);
    Ok(km.max(0.0))
}

pub fn duration_minutes(distance_km: f64, mode: TravelMode) -> u32 {
    let hours = distance_km.max(0.0) / mode.speed_kmh();
    (hours * 60.0).round() as u32
}

pub fn round_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

// Candidates within `radius_km` of `center`, closest first.
pub fn find_nearby<T, F>(
    center: &Coordinates,
    candidates: &[T],
    radius_km: f64,
    coordinates_of: F,
) -> Result<Vec<(T, f64)>>
where
    T: Clone,
    F: Fn(&T) -> Coordinates,
{
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(RouteError::invalid_input(format!(
            "radius {} must be a non-negative number",
            radius_km
        )));
    }

    let mut results = Vec::new();
    for candidate in candidates {
        let km = distance_km(center, &coordinates_of(candidate))?;
        if km <= radius_km {
            results.push((candidate.clone(), round_km(km)));
        }
    }
    results.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(results)
}
