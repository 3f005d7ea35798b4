// Planner configuration: JSON file with defaults, then TRAVEL_* environment overrides

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::itinerary::ItineraryConfig;

pub const ENV_SWEEP_INTERVAL: &str = "TRAVEL_CACHE_SWEEP_INTERVAL_SECS";
pub const ENV_FLIGHT_TTL: &str = "TRAVEL_FLIGHT_TTL_SECS";
pub const ENV_REFERENCE_TTL: &str = "TRAVEL_REFERENCE_TTL_SECS";
pub const ENV_ROUTE_TTL: &str = "TRAVEL_ROUTE_TTL_SECS";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidOverride { name: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub cache: CacheConfig,
    pub itinerary: ItineraryConfig,
}

impl PlannerConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: PlannerConfig =
            serde_json::from_str(json).context("Failed to parse planner configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&content)
    }

    // Defaults, or the given file, with environment overrides applied on top.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut u64); 4] = [
            (ENV_SWEEP_INTERVAL, &mut self.cache.sweep_interval_seconds),
            (ENV_FLIGHT_TTL, &mut self.cache.ttl.flight_offers_seconds),
            (ENV_REFERENCE_TTL, &mut self.cache.ttl.reference_data_seconds),
            (ENV_ROUTE_TTL, &mut self.cache.ttl.routes_seconds),
        ];
        for (name, target) in targets {
            if let Some(value) = var(name) {
                *target = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        name: name.to_string(),
                        value: value.clone(),
                    })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cache.sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }
        let ttl = &self.cache.ttl;
        if ttl.flight_offers_seconds == 0 || ttl.reference_data_seconds == 0 || ttl.routes_seconds == 0 {
            return Err(ConfigError::Invalid("cache TTLs must be greater than zero".to_string()));
        }
        if self.itinerary.max_passengers == 0 {
            return Err(ConfigError::Invalid(
                "itinerary.max_passengers must be at least 1".to_string(),
            ));
        }
        if !self.itinerary.ground_leg_cost.is_finite() || self.itinerary.ground_leg_cost < 0.0 {
            return Err(ConfigError::Invalid(
                "itinerary.ground_leg_cost must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
