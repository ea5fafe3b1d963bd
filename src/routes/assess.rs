//! C7: synchronous assess facade.
//!
//! Grounded on the teacher's `routes::races`/`routes::forecasts` — `State`
//! extractors, `utoipa::path` annotations, explicit query-param structs.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::AppError;
use crate::geo::GeoPoint2;
use crate::services::impact;
use crate::spatial::{corridor, store::SpatialStore};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AssessRouteQuery {
    pub lat_start: Option<f64>,
    pub lon_start: Option<f64>,
    pub lat_end: Option<f64>,
    pub lon_end: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssessRouteResponse {
    pub route: Vec<GeoPoint2>,
    pub route_distance: f64,
    pub population_impact: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_impact_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_risk: Option<f64>,
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::InvalidInput(format!("coordinate out of range: ({lat}, {lon})")));
    }
    Ok(())
}

/// `GET /routes/assess-route` — assess the ground-impact profile of the
/// straight-line flight between two points (§4.7).
#[utoipa::path(
    get,
    path = "/routes/assess-route",
    tag = "Routes",
    params(AssessRouteQuery),
    responses(
        (status = 200, description = "Assessment computed", body = AssessRouteResponse),
        (status = 400, description = "Missing or invalid coordinates"),
    )
)]
pub async fn assess_route(
    State(store): State<SpatialStore>,
    Query(query): Query<AssessRouteQuery>,
) -> Result<Json<AssessRouteResponse>, AppError> {
    let (lat_start, lon_start, lat_end, lon_end) = match (query.lat_start, query.lon_start, query.lat_end, query.lon_end) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return Err(AppError::InvalidInput("latStart, lonStart, latEnd, lonEnd are all required".into())),
    };

    validate_coordinates(lat_start, lon_start)?;
    validate_coordinates(lat_end, lon_end)?;

    let start = GeoPoint2::new(lat_start, lon_start);
    let end = GeoPoint2::new(lat_end, lon_end);

    let deadline = std::time::Duration::from_secs(30);
    let response = tokio::time::timeout(deadline, run_assessment(&store, start, end))
        .await
        .map_err(|_| AppError::DeadlineExceeded)??;

    Ok(Json(response))
}

async fn run_assessment(
    store: &SpatialStore,
    start: GeoPoint2,
    end: GeoPoint2,
) -> Result<AssessRouteResponse, AppError> {
    let hashes = corridor::route_hashes(start, end, store.p_pk(), 1000.0, 10_000.0);
    let points = store.fetch_by_hash_prefixes(&hashes, false).await;

    // Straight-line assess applies the per-type threshold once, to the
    // whole line (§9 design note) — unlike the optimized path's
    // per-segment application.
    let filtered = corridor::points_near_segment(start, end, &points);

    let route = vec![start, end];
    let route_distance = impact::route_distance_km(&route);
    let population_impact = impact::population_impact(&filtered);
    let noise_impact_score = Some(impact::noise_impact(population_impact));
    let weather = impact::weather_impact(&filtered);

    Ok(AssessRouteResponse {
        route,
        route_distance,
        population_impact,
        noise_impact_score,
        visibility_risk: weather.as_ref().map(|w| w.visibility_risk),
        wind_risk: weather.as_ref().map(|w| w.wind_risk),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_latitude_out_of_range() {
        assert!(validate_coordinates(91.0, 0.0).is_err());
    }

    #[test]
    fn rejects_longitude_out_of_range() {
        assert!(validate_coordinates(0.0, 181.0).is_err());
    }

    #[test]
    fn accepts_valid_coordinates() {
        assert!(validate_coordinates(51.5074, -0.1278).is_ok());
    }
}
