//! Core data model (§3): `GeoPoint` as a tagged variant, `RouteRecord`.
//!
//! Grounded on the teacher's `db::models` (`FromRow` derive at the
//! persistence boundary) but using `f64` in-memory per the geometry
//! kernel, converted at the query layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geo::GeoPoint2;

/// A population grid cell (~1 km²). Population is treated as immutable for
/// the process lifetime once loaded (§3 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PopulationCell {
    pub lat: f64,
    pub lon: f64,
    pub population: i64,
}

/// A weather observation. Optional fields reflect that not every METAR
/// record carries every measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherReport {
    pub lat: f64,
    pub lon: f64,
    pub temperature_c: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub visibility_meters: Option<f64>,
    pub precipitation_level: Option<u8>,
    pub data_timestamp: DateTime<Utc>,
    pub record_timestamp: DateTime<Utc>,
    pub ttl: DateTime<Utc>,
}

/// A geopoint is either a population cell or a weather report — the tagged
/// variant the spec's §9 redesign flag asks for in place of the source's
/// loosely typed records, with exhaustive matches at every C4/C5 call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum GeoPoint {
    Population(PopulationCell),
    Weather(WeatherReport),
}

impl GeoPoint {
    pub fn lat(&self) -> f64 {
        match self {
            GeoPoint::Population(p) => p.lat,
            GeoPoint::Weather(w) => w.lat,
        }
    }

    pub fn lon(&self) -> f64 {
        match self {
            GeoPoint::Population(p) => p.lon,
            GeoPoint::Weather(w) => w.lon,
        }
    }

    pub fn point(&self) -> GeoPoint2 {
        GeoPoint2::new(self.lat(), self.lon())
    }

    /// The `<type>#` prefix used in the sort key (§3).
    pub fn type_tag(&self) -> &'static str {
        match self {
            GeoPoint::Population(_) => "Population",
            GeoPoint::Weather(_) => "Weather",
        }
    }
}

/// A route submitted for optimization (§3 RouteRecord).
///
/// Created by `C8.submit` with only `route_points`; updated exactly once
/// by the worker with optimization output. Never re-inserted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteRecord {
    pub id: String,
    pub route_points: [GeoPoint2; 2],
    pub created_at: DateTime<Utc>,
    pub ttl: DateTime<Utc>,
    pub optimised_route: Option<Vec<GeoPoint2>>,
    pub optimised_route_distance_km: Option<f64>,
    pub population_impact: Option<f64>,
    pub noise_impact: Option<f64>,
    pub visibility_risk: Option<f64>,
    pub wind_risk: Option<f64>,
}

impl RouteRecord {
    pub fn start(&self) -> GeoPoint2 {
        self.route_points[0]
    }

    pub fn end(&self) -> GeoPoint2 {
        self.route_points[1]
    }
}

/// The optimization outputs a completed worker run produces, mirroring the
/// assess response shape plus the route id (§4.8 step 5 event payload).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OptimizationOutcome {
    pub route: Vec<GeoPoint2>,
    pub route_distance_km: f64,
    pub population_impact: f64,
    pub noise_impact: Option<f64>,
    pub visibility_risk: Option<f64>,
    pub wind_risk: Option<f64>,
}
