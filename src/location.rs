// Location resolution
//
// Maps logical waypoints (airport code, hotel id, raw coordinates) to coordinates.
// Identifier lookups go through an injected `LocationLookup`; the resolver itself
// never caches, wrap the lookup in `CachedLocationLookup` for that.

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{create_cache_key, ResponseCache, LOCATIONS_NAMESPACE};
use crate::error::{Result, RouteError};
use crate::geo::Coordinates;
use crate::models::{require_identifier, LocationRecord, ResolvedPoint, Waypoint, WaypointKind};
use crate::upstream::UpstreamError;

// Reference data source for airports and hotels.
#[async_trait]
pub trait LocationLookup: Send + Sync {
    // `Ok(None)` means the identifier is unknown for that kind.
    async fn lookup(
        &self,
        kind: WaypointKind,
        identifier: &str,
    ) -> std::result::Result<Option<LocationRecord>, UpstreamError>;
}

#[async_trait]
impl<L: LocationLookup + ?Sized> LocationLookup for Arc<L> {
    async fn lookup(
        &self,
        kind: WaypointKind,
        identifier: &str,
    ) -> std::result::Result<Option<LocationRecord>, UpstreamError> {
        (**self).lookup(kind, identifier).await
    }
}

#[derive(Clone)]
pub struct LocationResolver {
    lookup: Arc<dyn LocationLookup>,
}

impl LocationResolver {
    pub fn new(lookup: Arc<dyn LocationLookup>) -> Self {
        Self { lookup }
    }

    // Resolves a waypoint. Explicit coordinates take precedence over the identifier.
    pub async fn resolve(&self, waypoint: &Waypoint) -> Result<ResolvedPoint> {
        if let Some(coordinates) = waypoint.coordinates {
            coordinates.validate()?;
            return Ok(ResolvedPoint {
                kind: waypoint.kind,
                identifier: waypoint
                    .identifier
                    .as_deref()
                    .map(|id| waypoint.kind.normalize_identifier(id)),
                coordinates,
            });
        }

        let identifier = require_identifier(waypoint).map_err(|_| {
            RouteError::resolution(format!(
                "{} waypoint has neither identifier nor coordinates",
                waypoint.kind
            ))
        })?;
        let identifier = waypoint.kind.normalize_identifier(identifier);

        debug!(kind = %waypoint.kind, %identifier, "looking up waypoint");
        let record = self
            .lookup
            .lookup(waypoint.kind, &identifier)
            .await?
            .ok_or_else(|| {
                RouteError::resolution(format!("{} '{}' not found", waypoint.kind, identifier))
            })?;

        let coordinates = record_coordinates(waypoint.kind, &record)?;
        Ok(ResolvedPoint {
            kind: waypoint.kind,
            identifier: Some(identifier),
            coordinates,
        })
    }

    // Resolves every waypoint, failing on the first one that cannot be resolved.
    pub async fn resolve_all(&self, waypoints: &[Waypoint]) -> Result<Vec<ResolvedPoint>> {
        try_join_all(waypoints.iter().map(|w| self.resolve(w))).await
    }
}

fn record_coordinates(kind: WaypointKind, record: &LocationRecord) -> Result<Coordinates> {
    match (record.latitude, record.longitude) {
        (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude).map_err(|e| {
            RouteError::resolution(format!(
                "{} '{}' has invalid coordinates: {}",
                kind, record.identifier, e
            ))
        }),
        _ => Err(RouteError::resolution(format!(
            "{} '{}' has no coordinates on record",
            kind, record.identifier
        ))),
    }
}

enum LookupMiss {
    NotFound,
    Upstream(UpstreamError),
}

// Caches found records for the reference-data TTL. Unknown identifiers are not cached.
pub struct CachedLocationLookup<L> {
    inner: L,
    cache: Arc<ResponseCache>,
}

impl<L: LocationLookup> CachedLocationLookup<L> {
    pub fn new(inner: L, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl<L: LocationLookup> LocationLookup for CachedLocationLookup<L> {
    async fn lookup(
        &self,
        kind: WaypointKind,
        identifier: &str,
    ) -> std::result::Result<Option<LocationRecord>, UpstreamError> {
        let identifier = kind.normalize_identifier(identifier);
        let key = create_cache_key(LOCATIONS_NAMESPACE, &[kind.as_str(), &identifier]);
        let ttl = self.cache.ttl_policy().reference_data();
        let result = self
            .cache
            .get_or_compute(&key, ttl, || async {
                match self.inner.lookup(kind, &identifier).await {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => Err(LookupMiss::NotFound),
                    Err(e) => Err(LookupMiss::Upstream(e)),
                }
            })
            .await;

        match result {
            Ok(record) => Ok(Some(record)),
            Err(LookupMiss::NotFound) => Ok(None),
            Err(LookupMiss::Upstream(e)) => Err(e),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub airports: Vec<LocationRecord>,
    pub hotels: Vec<LocationRecord>,
}

// Reference data held in memory, loaded from JSON or inserted directly.
#[derive(Default)]
pub struct InMemoryLocationLookup {
    records: RwLock<HashMap<(WaypointKind, String), LocationRecord>>,
    lookup_count: AtomicUsize,
}

impl InMemoryLocationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reference_data(data: ReferenceData) -> Self {
        let lookup = Self::new();
        for record in data.airports {
            lookup.insert(WaypointKind::Airport, record);
        }
        for record in data.hotels {
            lookup.insert(WaypointKind::Hotel, record);
        }
        lookup
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let data: ReferenceData = serde_json::from_str(json)?;
        Ok(Self::from_reference_data(data))
    }

    pub fn insert(&self, kind: WaypointKind, record: LocationRecord) {
        let key = (kind, kind.normalize_identifier(&record.identifier));
        self.records.write().insert(key, record);
    }

    pub fn records(&self, kind: WaypointKind) -> Vec<LocationRecord> {
        let mut records: Vec<LocationRecord> = self
            .records
            .read()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        records
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationLookup for InMemoryLocationLookup {
    async fn lookup(
        &self,
        kind: WaypointKind,
        identifier: &str,
    ) -> std::result::Result<Option<LocationRecord>, UpstreamError> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        let key = (kind, kind.normalize_identifier(identifier));
        Ok(self.records.read().get(&key).cloned())
    }
}
